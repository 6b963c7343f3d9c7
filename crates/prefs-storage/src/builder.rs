use std::path::PathBuf;

use dirs::data_dir;
use prefs_core::store::StoreError;
use tracing::debug;

use crate::{
    encrypted_file_store::EncryptedPrefsStore,
    key_provider::{KeyProvider, KeyringProvider},
};

pub const DEFAULT_FILE_NAME: &str = "preferences";

const MASTER_KEY_ACCOUNT: &str = "master-key";

/// Factory for encrypted preference stores. `app` names both the keyring
/// service holding the master key and the subdirectory under the platform
/// data dir holding the store files.
pub struct StoreBuilder {
    app: String,
    file_name: String,
    root: Option<PathBuf>,
}

impl StoreBuilder {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            root: None,
        }
    }

    /// Store file name; defaults to `"preferences"`. One file per name;
    /// building twice with the same name and key material yields handles
    /// over the same data.
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = name.into();
        self
    }

    /// Override the platform data dir.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Build a production store keyed from the OS keyring.
    pub fn build(self) -> Result<EncryptedPrefsStore<KeyringProvider>, StoreError> {
        let provider = KeyringProvider::new(self.app.clone(), MASTER_KEY_ACCOUNT);
        self.build_with_provider(provider)
    }

    /// Build a store with a caller-supplied key provider (tests, ephemeral
    /// sessions).
    pub fn build_with_provider<P: KeyProvider>(
        self,
        key_provider: P,
    ) -> Result<EncryptedPrefsStore<P>, StoreError> {
        let root = match self.root {
            Some(root) => root,
            None => default_data_dir(&self.app)?,
        };
        debug!(?root, file_name = %self.file_name, "opening encrypted preference store");

        // Provision the master key up front so keyring failures surface at
        // build time rather than on the first read.
        key_provider
            .get_or_create()
            .map_err(|e| StoreError::Storage {
                reason: format!("key provider: {e}"),
            })?;

        Ok(EncryptedPrefsStore::open(root, self.file_name, key_provider))
    }
}

fn default_data_dir(app: &str) -> Result<PathBuf, StoreError> {
    let base = data_dir().ok_or_else(|| StoreError::Storage {
        reason: "no data dir available".to_string(),
    })?;
    Ok(base.join(app))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_provider::InMemoryKeyProvider;
    use prefs_core::{preference::Preference, store::PrefStore};

    #[test]
    fn default_file_name_is_preferences() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = StoreBuilder::new("prefs-test")
            .root(dir.path())
            .build_with_provider(InMemoryKeyProvider::default())
            .expect("build");

        assert_eq!(store.path(), dir.path().join("preferences"));
    }

    #[test]
    fn rebuilt_store_reads_back_previous_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = InMemoryKeyProvider::default();

        let store = StoreBuilder::new("prefs-test")
            .root(dir.path())
            .build_with_provider(provider.clone())
            .expect("build");
        let login = Preference::new(&store, "LOGIN", String::new());
        login.write(&"alice".to_string()).expect("write");
        drop(login);
        drop(store);

        let rebuilt = StoreBuilder::new("prefs-test")
            .root(dir.path())
            .build_with_provider(provider)
            .expect("rebuild");
        let login = Preference::new(&rebuilt, "LOGIN", String::new());
        assert_eq!(login.read().expect("read"), "alice");
    }

    #[test]
    fn distinct_file_names_hold_distinct_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = InMemoryKeyProvider::default();

        let main = StoreBuilder::new("prefs-test")
            .root(dir.path())
            .build_with_provider(provider.clone())
            .expect("build");
        let side = StoreBuilder::new("prefs-test")
            .root(dir.path())
            .file_name("session")
            .build_with_provider(provider)
            .expect("build");

        main.put_bool("ENABLED", true).expect("put");
        assert_eq!(side.get_bool("ENABLED").expect("get"), None);
    }
}
