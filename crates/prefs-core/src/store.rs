use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by preference store implementations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
    /// A typed getter found a slot of a different kind.
    #[error("slot type mismatch for key {key}: expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// The value kinds a store holds natively. Everything else is encoded into a
/// string slot by the accessor layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Slot {
    Str(String),
    I64(i64),
    I32(i32),
    F32(f32),
    Bool(bool),
}

impl Slot {
    pub fn kind(&self) -> &'static str {
        match self {
            Slot::Str(_) => "str",
            Slot::I64(_) => "i64",
            Slot::I32(_) => "i32",
            Slot::F32(_) => "f32",
            Slot::Bool(_) => "bool",
        }
    }
}

/// Contract for a named key-value preference store. Implementations provide
/// per-key atomicity; there is no cross-key transactional guarantee.
pub trait PrefStore: Send + Sync {
    /// Retrieve the slot stored under a key, if any.
    fn get(&self, key: &str) -> Result<Option<Slot>, StoreError>;

    /// Store a slot under a key, overwriting any existing entry.
    fn put(&self, key: &str, slot: Slot) -> Result<(), StoreError>;

    /// Remove a key and its slot (idempotent).
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Whether any slot is stored under the key.
    fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.get(key)? {
            Some(Slot::Str(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(key, "str", &other)),
            None => Ok(None),
        }
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(key, Slot::Str(value.to_owned()))
    }

    fn get_i64(&self, key: &str) -> Result<Option<i64>, StoreError> {
        match self.get(key)? {
            Some(Slot::I64(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(key, "i64", &other)),
            None => Ok(None),
        }
    }

    fn put_i64(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.put(key, Slot::I64(value))
    }

    fn get_i32(&self, key: &str) -> Result<Option<i32>, StoreError> {
        match self.get(key)? {
            Some(Slot::I32(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(key, "i32", &other)),
            None => Ok(None),
        }
    }

    fn put_i32(&self, key: &str, value: i32) -> Result<(), StoreError> {
        self.put(key, Slot::I32(value))
    }

    fn get_f32(&self, key: &str) -> Result<Option<f32>, StoreError> {
        match self.get(key)? {
            Some(Slot::F32(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(key, "f32", &other)),
            None => Ok(None),
        }
    }

    fn put_f32(&self, key: &str, value: f32) -> Result<(), StoreError> {
        self.put(key, Slot::F32(value))
    }

    fn get_bool(&self, key: &str) -> Result<Option<bool>, StoreError> {
        match self.get(key)? {
            Some(Slot::Bool(value)) => Ok(Some(value)),
            Some(other) => Err(mismatch(key, "bool", &other)),
            None => Ok(None),
        }
    }

    fn put_bool(&self, key: &str, value: bool) -> Result<(), StoreError> {
        self.put(key, Slot::Bool(value))
    }
}

fn mismatch(key: &str, expected: &'static str, found: &Slot) -> StoreError {
    StoreError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

/// In-memory preference store for tests and ephemeral sessions. Slots are
/// held in plaintext; production stores must encrypt at rest.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPrefStore {
    inner: Arc<Mutex<HashMap<String, Slot>>>,
}

impl InMemoryPrefStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrefStore for InMemoryPrefStore {
    fn get(&self, key: &str) -> Result<Option<Slot>, StoreError> {
        let map = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &str, slot: Slot) -> Result<(), StoreError> {
        let mut map = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.insert(key.to_string(), slot);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        map.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_helpers_round_trip_native_slots() {
        let store = InMemoryPrefStore::new();

        store.put_string("name", "alice").expect("put string");
        store.put_i64("count", -7).expect("put i64");
        store.put_i32("retries", 3).expect("put i32");
        store.put_f32("ratio", 0.25).expect("put f32");
        store.put_bool("enabled", true).expect("put bool");

        assert_eq!(store.get_string("name").expect("get"), Some("alice".into()));
        assert_eq!(store.get_i64("count").expect("get"), Some(-7));
        assert_eq!(store.get_i32("retries").expect("get"), Some(3));
        assert_eq!(store.get_f32("ratio").expect("get"), Some(0.25));
        assert_eq!(store.get_bool("enabled").expect("get"), Some(true));
    }

    #[test]
    fn missing_key_reads_as_none() {
        let store = InMemoryPrefStore::new();
        assert_eq!(store.get_string("absent").expect("get"), None);
        assert!(!store.contains("absent").expect("contains"));
    }

    #[test]
    fn typed_getter_rejects_wrong_slot_kind() {
        let store = InMemoryPrefStore::new();
        store.put_i64("count", 1).expect("put");

        let err = store
            .get_string("count")
            .expect_err("i64 slot must not read as string");
        assert_eq!(
            err,
            StoreError::TypeMismatch {
                key: "count".into(),
                expected: "str",
                found: "i64",
            }
        );
    }

    #[test]
    fn remove_is_idempotent_and_removes_data() {
        let store = InMemoryPrefStore::new();
        store.put_bool("flag", true).expect("put");
        store.remove("flag").expect("remove");
        store.remove("flag").expect("remove again");

        assert_eq!(store.get_bool("flag").expect("get"), None);
    }
}
