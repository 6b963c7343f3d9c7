//! Core contracts for encrypted preferences: the slot value model, the store
//! trait, and typed accessors. This crate is intentionally small to keep
//! dependency surface minimal.

pub mod preference;
pub mod store;
