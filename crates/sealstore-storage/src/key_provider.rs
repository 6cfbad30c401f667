use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};

use sealstore_core::key::{KeyError, KeyMaterial, KeyProvider, KeySize};

/// OS keyring-backed provider: one keyring entry per alias under a fixed
/// service name, key bytes stored base64-encoded.
pub struct KeyringProvider {
    service: String,
    creation: Mutex<()>,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            creation: Mutex::new(()),
        }
    }
}

impl KeyProvider for KeyringProvider {
    fn load_key(&self, alias: &str, size: KeySize) -> Result<KeyMaterial, KeyError> {
        // Held across the miss -> generate -> store window so concurrent
        // first-time callers cannot create two different keys.
        let _guard = self
            .creation
            .lock()
            .map_err(|err| provider_err(format!("lock poisoned: {err}")))?;

        let entry = keyring::Entry::new(&self.service, alias)
            .map_err(|err| provider_err(err.to_string()))?;

        match entry.get_password() {
            Ok(secret) => decode_key(alias, &secret, size),
            Err(keyring::Error::NoEntry) => {
                let material = generate_key(alias, size);
                entry
                    .set_password(&general_purpose::STANDARD.encode(material.bytes()))
                    .map_err(|err| provider_err(err.to_string()))?;
                Ok(material)
            }
            Err(err) => Err(provider_err(err.to_string())),
        }
    }
}

/// In-memory provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<HashMap<String, KeyMaterial>>>,
}

impl InMemoryKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyProvider for InMemoryKeyProvider {
    fn load_key(&self, alias: &str, size: KeySize) -> Result<KeyMaterial, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| provider_err(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.get(alias) {
            if existing.bytes().len() != size.byte_len() {
                return Err(size_mismatch(existing.bytes().len(), size));
            }
            return Ok(existing.clone());
        }

        let material = generate_key(alias, size);
        guard.insert(alias.to_string(), material.clone());
        Ok(material)
    }
}

fn generate_key(alias: &str, size: KeySize) -> KeyMaterial {
    let mut bytes = vec![0u8; size.byte_len()];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial::new(alias, bytes)
}

fn decode_key(alias: &str, secret: &str, size: KeySize) -> Result<KeyMaterial, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|err| provider_err(format!("stored key decode: {err}")))?;

    if bytes.len() != size.byte_len() {
        return Err(size_mismatch(bytes.len(), size));
    }
    Ok(KeyMaterial::new(alias, bytes))
}

fn size_mismatch(stored: usize, requested: KeySize) -> KeyError {
    // Regenerating here would orphan every existing ciphertext.
    provider_err(format!(
        "alias holds a {stored}-byte key, requested {} bytes",
        requested.byte_len()
    ))
}

fn provider_err(reason: impl Into<String>) -> KeyError {
    KeyError::Provider {
        reason: reason.into(),
    }
}
