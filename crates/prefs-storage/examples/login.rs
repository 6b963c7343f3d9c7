//! Minimal login flow on top of an encrypted preference store: a string
//! login, an authorization flag, and a last-login instant.
//!
//! Run with `cargo run --example login`. Uses the OS keyring for the master
//! key, so it will prompt for keychain access on some platforms.

use chrono::Utc;
use prefs_core::preference::Preference;
use prefs_storage::builder::StoreBuilder;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let store = StoreBuilder::new("prefs-demo").build()?;

    let login = Preference::new(&store, "LOGIN", String::new());
    let authorized = Preference::new(&store, "AUTHORIZED", false);
    let last_login_time = Preference::new(&store, "LAST_LOGIN_TIME", Utc::now());

    if login.read()?.is_empty() {
        println!("first run, signing in");
        login.write(&"alice".to_string())?;
        authorized.write(&true)?;
        last_login_time.write(&Utc::now())?;
    }

    println!("login:      {}", login.read()?);
    println!("authorized: {}", authorized.read()?);
    println!("last login: {}", last_login_time.read()?);
    Ok(())
}
