//! Encrypted preference storage with encryption at rest.
//! Uses AES-GCM for values and AES-SIV for the key index, with the master
//! key sourced from the OS keyring (or test doubles).

pub mod builder;
pub mod encrypted_file_store;
pub mod key_provider;
