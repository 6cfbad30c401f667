//! Concrete sealstore implementations with encryption at rest.
//! AES-GCM engine, key providers sourced from the OS keyring (or test
//! doubles), and the typed encrypted key-value store.

pub mod engine;
pub mod file_store;
pub mod key_provider;
pub mod store;
pub mod value;
