use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use aes_siv::siv::Aes256Siv;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use prefs_core::store::{PrefStore, Slot, StoreError};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::instrument;

use crate::key_provider::{KeyProvider, MasterKey};

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// File-backed encrypted preference store implementing the shared `PrefStore`
/// contract. One file per store name: a JSON map from the AES-SIV encrypted
/// key index to AES-GCM value blobs. The master key is persisted via a
/// `KeyProvider` (OS keyring in production).
///
/// The key index is deterministic, so lookups work without decrypting it;
/// the store file name is bound as associated data. A process-local mutex
/// serializes file access, giving read-after-write consistency within the
/// process. Cross-process coordination is out of scope.
pub struct EncryptedPrefsStore<P: KeyProvider> {
    path: PathBuf,
    file_name: String,
    key_provider: P,
    io_lock: Mutex<()>,
}

impl<P: KeyProvider> EncryptedPrefsStore<P> {
    /// Open (creating lazily on first write) the store file `file_name`
    /// under `root`.
    pub fn open(
        root: impl Into<PathBuf>,
        file_name: impl Into<String>,
        key_provider: P,
    ) -> Self {
        let root = root.into();
        let file_name = file_name.into();
        Self {
            path: root.join(&file_name),
            file_name,
            key_provider,
            io_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn master_key(&self) -> Result<MasterKey, StoreError> {
        self.key_provider
            .get_or_create()
            .map_err(|e| StoreError::Storage {
                reason: format!("key provider: {e}"),
            })
    }

    /// Deterministically seal a preference key for use as a file-map index.
    fn seal_index_key(&self, material: &MasterKey, key: &str) -> Result<String, StoreError> {
        let mut cipher =
            Aes256Siv::new_from_slice(&material.index_bytes).map_err(|e| StoreError::Storage {
                reason: format!("cipher init failed: {e}"),
            })?;
        let sealed = cipher
            .encrypt([self.file_name.as_bytes()], key.as_bytes())
            .map_err(|e| StoreError::Storage {
                reason: format!("key index encrypt failed: {e}"),
            })?;
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    fn load_file(&self) -> Result<PrefsFile, StoreError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PrefsFile::default())
            }
            Err(err) => return Err(storage_err(err)),
        };

        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(storage_err)?;
        serde_json::from_slice(&buf).map_err(storage_err)
    }

    fn persist_file(&self, contents: &PrefsFile) -> Result<(), StoreError> {
        let parent = self.path.parent().ok_or_else(|| StoreError::Storage {
            reason: "invalid storage path".to_string(),
        })?;
        fs::create_dir_all(parent).map_err(storage_err)?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
        let json = serde_json::to_vec(contents).map_err(storage_err)?;
        tmp.write_all(&json).map_err(storage_err)?;
        tmp.flush().map_err(storage_err)?;
        tmp.persist(&self.path).map_err(|e| storage_err(e.error))?;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PrefsFile {
    entries: BTreeMap<String, SealedEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedEntry {
    nonce: String,
    ciphertext: String,
}

impl<P: KeyProvider> PrefStore for EncryptedPrefsStore<P> {
    #[instrument(skip_all, fields(key))]
    fn get(&self, key: &str) -> Result<Option<Slot>, StoreError> {
        let _guard = self.io_lock.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        let material = self.master_key()?;
        let contents = self.load_file()?;
        let index = self.seal_index_key(&material, key)?;
        let Some(entry) = contents.entries.get(&index) else {
            return Ok(None);
        };

        let cipher = build_value_cipher(&material)?;
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(&entry.nonce)
            .map_err(|e| StoreError::Storage {
                reason: format!("nonce decode failed: {e}"),
            })?;
        // A tampered file can carry valid base64 of the wrong length; reject
        // it here rather than panicking in the nonce constructor.
        if nonce_bytes.len() != NONCE_LEN {
            return Err(StoreError::Storage {
                reason: format!(
                    "nonce decode failed: expected {NONCE_LEN} bytes, got {}",
                    nonce_bytes.len()
                ),
            });
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext =
            URL_SAFE_NO_PAD
                .decode(&entry.ciphertext)
                .map_err(|e| StoreError::Storage {
                    reason: format!("ciphertext decode failed: {e}"),
                })?;

        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|e| StoreError::Storage {
                reason: format!("decrypt failed: {e}"),
            })?;
        serde_json::from_slice(&plaintext).map(Some).map_err(storage_err)
    }

    #[instrument(skip_all, fields(key))]
    fn put(&self, key: &str, slot: Slot) -> Result<(), StoreError> {
        let _guard = self.io_lock.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        let material = self.master_key()?;
        let mut contents = self.load_file()?;
        let index = self.seal_index_key(&material, key)?;

        let cipher = build_value_cipher(&material)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let plaintext = serde_json::to_vec(&slot).map_err(storage_err)?;
        let ciphertext =
            cipher
                .encrypt(&nonce, plaintext.as_ref())
                .map_err(|e| StoreError::Storage {
                    reason: format!("encrypt failed: {e}"),
                })?;

        contents.entries.insert(
            index,
            SealedEntry {
                nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
                ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
            },
        );
        self.persist_file(&contents)
    }

    #[instrument(skip_all, fields(key))]
    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.io_lock.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        let material = self.master_key()?;
        let mut contents = self.load_file()?;
        let index = self.seal_index_key(&material, key)?;
        if contents.entries.remove(&index).is_some() {
            self.persist_file(&contents)?;
        }
        Ok(())
    }
}

fn build_value_cipher(material: &MasterKey) -> Result<Aes256Gcm, StoreError> {
    Aes256Gcm::new_from_slice(&material.value_bytes).map_err(|e| StoreError::Storage {
        reason: format!("cipher init failed: {e}"),
    })
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_provider::InMemoryKeyProvider;

    fn test_store(root: &Path) -> EncryptedPrefsStore<InMemoryKeyProvider> {
        EncryptedPrefsStore::open(root, "preferences", InMemoryKeyProvider::default())
    }

    #[test]
    fn round_trip_encrypts_and_decrypts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path());

        store
            .put("LOGIN", Slot::Str("hello-alice".into()))
            .expect("put");
        let slot = store.get("LOGIN").expect("get");
        assert_eq!(slot, Some(Slot::Str("hello-alice".into())));

        // ensure neither key names nor values appear in plaintext on disk
        let stored = fs::read_to_string(store.path()).expect("read ciphertext");
        assert!(!stored.contains("hello-alice"), "plaintext value on disk");
        assert!(!stored.contains("LOGIN"), "plaintext key on disk");
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path());

        assert_eq!(store.get("anything").expect("get"), None);
        assert!(!store.contains("anything").expect("contains"));
    }

    #[test]
    fn rewriting_a_key_keeps_a_single_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path());

        store.put("COUNT", Slot::I64(1)).expect("put");
        store.put("COUNT", Slot::I64(2)).expect("put again");

        let contents = store.load_file().expect("load");
        assert_eq!(contents.entries.len(), 1, "key index must be deterministic");
        assert_eq!(store.get("COUNT").expect("get"), Some(Slot::I64(2)));
    }

    #[test]
    fn reopening_reads_back_previous_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = InMemoryKeyProvider::default();

        let store = EncryptedPrefsStore::open(dir.path(), "preferences", provider.clone());
        store.put("ENABLED", Slot::Bool(true)).expect("put");
        drop(store);

        let reopened = EncryptedPrefsStore::open(dir.path(), "preferences", provider);
        assert_eq!(reopened.get("ENABLED").expect("get"), Some(Slot::Bool(true)));
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path());

        store.put("FLAG", Slot::Bool(true)).expect("put");
        store.remove("FLAG").expect("remove");
        store.remove("FLAG").expect("remove again");
        assert_eq!(store.get("FLAG").expect("get"), None);
    }

    #[test]
    fn wrong_length_nonce_surfaces_storage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path());

        store.put("FLAG", Slot::Bool(true)).expect("put");

        // Rewrite the stored nonce to valid base64 of the wrong length.
        let mut contents = store.load_file().expect("load");
        for entry in contents.entries.values_mut() {
            entry.nonce = URL_SAFE_NO_PAD.encode([0u8; 3]);
        }
        store.persist_file(&contents).expect("persist");

        let err = store.get("FLAG").expect_err("truncated nonce must error");
        assert!(matches!(err, StoreError::Storage { .. }));
    }

    #[test]
    fn corrupt_file_surfaces_storage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = test_store(dir.path());

        store.put("FLAG", Slot::Bool(true)).expect("put");
        fs::write(store.path(), b"not-json").expect("clobber file");

        let err = store.get("FLAG").expect_err("corrupt file must error");
        assert!(matches!(err, StoreError::Storage { .. }));
    }
}
