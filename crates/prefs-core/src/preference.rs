use bigdecimal::BigDecimal;
use chrono::{DateTime, TimeZone, Utc};
use num_bigint::BigInt;

use crate::store::{PrefStore, StoreError};

/// A typed read/write binding to one named entry in a preference store.
///
/// Holds a shared store handle, a key, and a default value. `read` resolves
/// the stored value and falls back to the default when the entry is absent
/// (or, for string-encoded kinds, unparsable). `write` persists immediately;
/// there is no caching layer between the accessor and the store.
///
/// The set of storable types is closed: `String`, `i64`, `i32`, `f32`, `f64`,
/// `bool`, `BigDecimal`, `BigInt`, and `DateTime<Utc>`. Anything else fails
/// to compile rather than erroring at runtime.
pub struct Preference<'s, T: Storable> {
    store: &'s dyn PrefStore,
    key: String,
    default: T,
}

impl<'s, T: Storable> Preference<'s, T> {
    /// Bind an accessor to `key` with the given fallback value. The key must
    /// be non-empty and unique per logical setting; accessors sharing a key
    /// read and write the same underlying slot.
    pub fn new(store: &'s dyn PrefStore, key: impl Into<String>, default: T) -> Self {
        let key = key.into();
        debug_assert!(!key.is_empty(), "preference key must be non-empty");
        Self {
            store,
            key,
            default,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Resolve the stored value, or the default when absent.
    pub fn read(&self) -> Result<T, StoreError> {
        T::load(self.store, &self.key, &self.default)
    }

    /// Persist a value under this accessor's key.
    pub fn write(&self, value: &T) -> Result<(), StoreError> {
        value.save(self.store, &self.key)
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for String {}
    impl Sealed for i64 {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for bool {}
    impl Sealed for bigdecimal::BigDecimal {}
    impl Sealed for num_bigint::BigInt {}
    impl Sealed for chrono::DateTime<chrono::Utc> {}
}

/// Encode/decode contract between a value type and its store slot. Sealed:
/// exactly the nine supported kinds implement it.
pub trait Storable: sealed::Sealed + Sized {
    fn load(store: &dyn PrefStore, key: &str, default: &Self) -> Result<Self, StoreError>;
    fn save(&self, store: &dyn PrefStore, key: &str) -> Result<(), StoreError>;
}

impl Storable for String {
    fn load(store: &dyn PrefStore, key: &str, default: &Self) -> Result<Self, StoreError> {
        Ok(store.get_string(key)?.unwrap_or_else(|| default.clone()))
    }

    fn save(&self, store: &dyn PrefStore, key: &str) -> Result<(), StoreError> {
        store.put_string(key, self)
    }
}

impl Storable for i64 {
    fn load(store: &dyn PrefStore, key: &str, default: &Self) -> Result<Self, StoreError> {
        Ok(store.get_i64(key)?.unwrap_or(*default))
    }

    fn save(&self, store: &dyn PrefStore, key: &str) -> Result<(), StoreError> {
        store.put_i64(key, *self)
    }
}

impl Storable for i32 {
    fn load(store: &dyn PrefStore, key: &str, default: &Self) -> Result<Self, StoreError> {
        Ok(store.get_i32(key)?.unwrap_or(*default))
    }

    fn save(&self, store: &dyn PrefStore, key: &str) -> Result<(), StoreError> {
        store.put_i32(key, *self)
    }
}

impl Storable for f32 {
    fn load(store: &dyn PrefStore, key: &str, default: &Self) -> Result<Self, StoreError> {
        Ok(store.get_f32(key)?.unwrap_or(*default))
    }

    fn save(&self, store: &dyn PrefStore, key: &str) -> Result<(), StoreError> {
        store.put_f32(key, *self)
    }
}

impl Storable for bool {
    fn load(store: &dyn PrefStore, key: &str, default: &Self) -> Result<Self, StoreError> {
        Ok(store.get_bool(key)?.unwrap_or(*default))
    }

    fn save(&self, store: &dyn PrefStore, key: &str) -> Result<(), StoreError> {
        store.put_bool(key, *self)
    }
}

// f64 has no native slot; it travels as its decimal string. An unparsable
// stored string resolves to the default rather than erroring.
impl Storable for f64 {
    fn load(store: &dyn PrefStore, key: &str, default: &Self) -> Result<Self, StoreError> {
        Ok(match store.get_string(key)? {
            Some(text) => text.parse().unwrap_or(*default),
            None => *default,
        })
    }

    fn save(&self, store: &dyn PrefStore, key: &str) -> Result<(), StoreError> {
        store.put_string(key, &self.to_string())
    }
}

impl Storable for BigDecimal {
    fn load(store: &dyn PrefStore, key: &str, default: &Self) -> Result<Self, StoreError> {
        Ok(match store.get_string(key)? {
            Some(text) => text.parse().unwrap_or_else(|_| default.clone()),
            None => default.clone(),
        })
    }

    fn save(&self, store: &dyn PrefStore, key: &str) -> Result<(), StoreError> {
        store.put_string(key, &self.to_string())
    }
}

impl Storable for BigInt {
    fn load(store: &dyn PrefStore, key: &str, default: &Self) -> Result<Self, StoreError> {
        Ok(match store.get_string(key)? {
            Some(text) => text.parse().unwrap_or_else(|_| default.clone()),
            None => default.clone(),
        })
    }

    fn save(&self, store: &dyn PrefStore, key: &str) -> Result<(), StoreError> {
        store.put_string(key, &self.to_string())
    }
}

// Instants are stored as milliseconds since the epoch, so writes truncate to
// millisecond precision.
impl Storable for DateTime<Utc> {
    fn load(store: &dyn PrefStore, key: &str, default: &Self) -> Result<Self, StoreError> {
        let parsed = store
            .get_string(key)?
            .and_then(|text| text.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single());
        Ok(parsed.unwrap_or(*default))
    }

    fn save(&self, store: &dyn PrefStore, key: &str) -> Result<(), StoreError> {
        store.put_string(key, &self.timestamp_millis().to_string())
    }
}
