use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// AES-256-SIV key for the deterministic key index.
pub const INDEX_KEY_LEN: usize = 64;
/// AES-256-GCM key for value encryption.
pub const VALUE_KEY_LEN: usize = 32;

const MASTER_KEY_LEN: usize = INDEX_KEY_LEN + VALUE_KEY_LEN;

/// Master key material backing one preference store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKey {
    /// Identifier for logging/rotation (never log key bytes).
    pub id: String,
    /// Key for the deterministic key-index cipher.
    pub index_bytes: [u8; INDEX_KEY_LEN],
    /// Key for the value cipher.
    pub value_bytes: [u8; VALUE_KEY_LEN],
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Provides access to the master key (OS keyring in production; memory in
/// tests).
pub trait KeyProvider: Send + Sync {
    fn get_or_create(&self) -> Result<MasterKey, KeyError>;
}

/// OS keyring-backed provider. Uses the `keyring` crate to store the key.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

impl KeyProvider for KeyringProvider {
    fn get_or_create(&self) -> Result<MasterKey, KeyError> {
        match keyring::Entry::new(&self.service, &self.account) {
            Ok(entry) => {
                if let Ok(secret) = entry.get_password() {
                    return decode_key(&secret);
                }

                let material = generate_key();
                entry
                    .set_password(&encode_key(&material))
                    .map_err(|e| KeyError::Keyring(e.to_string()))?;
                Ok(material)
            }
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<MasterKey>>>,
}

impl KeyProvider for InMemoryKeyProvider {
    fn get_or_create(&self) -> Result<MasterKey, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let material = generate_key();
        *guard = Some(material.clone());
        Ok(material)
    }
}

fn generate_key() -> MasterKey {
    let mut index_bytes = [0u8; INDEX_KEY_LEN];
    let mut value_bytes = [0u8; VALUE_KEY_LEN];
    OsRng.fill_bytes(&mut index_bytes);
    OsRng.fill_bytes(&mut value_bytes);
    MasterKey {
        id: "default".to_string(),
        index_bytes,
        value_bytes,
    }
}

fn encode_key(material: &MasterKey) -> String {
    let mut bytes = Vec::with_capacity(MASTER_KEY_LEN);
    bytes.extend_from_slice(&material.index_bytes);
    bytes.extend_from_slice(&material.value_bytes);
    general_purpose::STANDARD.encode(bytes)
}

fn decode_key(secret: &str) -> Result<MasterKey, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    if bytes.len() != MASTER_KEY_LEN {
        return Err(KeyError::Decode(format!(
            "expected {MASTER_KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let mut index_bytes = [0u8; INDEX_KEY_LEN];
    let mut value_bytes = [0u8; VALUE_KEY_LEN];
    index_bytes.copy_from_slice(&bytes[..INDEX_KEY_LEN]);
    value_bytes.copy_from_slice(&bytes[INDEX_KEY_LEN..]);
    Ok(MasterKey {
        id: "default".to_string(),
        index_bytes,
        value_bytes,
    })
}
