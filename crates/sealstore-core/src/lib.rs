//! Core contracts for sealstore: key-material provisioning and the plain
//! key-value collaborator that encrypted stores wrap.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod key;
pub mod plain;
