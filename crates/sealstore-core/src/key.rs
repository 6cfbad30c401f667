use std::{fmt, sync::Arc};

use thiserror::Error;

/// AES key sizes the engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySize {
    Bits128,
    Bits256,
}

impl KeySize {
    /// Validates a bit count at the API boundary. Everything past this point
    /// carries the enum and cannot name an unsupported size.
    pub fn from_bits(bits: u32) -> Result<Self, KeyError> {
        match bits {
            128 => Ok(Self::Bits128),
            256 => Ok(Self::Bits256),
            _ => Err(KeyError::InvalidKeySize { bits }),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::Bits128 => 128,
            Self::Bits256 => 256,
        }
    }

    pub fn byte_len(self) -> usize {
        match self {
            Self::Bits128 => 16,
            Self::Bits256 => 32,
        }
    }
}

/// Key material resolved for an alias (never log key bytes).
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    alias: String,
    bytes: Vec<u8>,
}

impl KeyMaterial {
    pub fn new(alias: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            alias: alias.into(),
            bytes,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("alias", &self.alias)
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("unsupported key size: {bits} bits")]
    InvalidKeySize { bits: u32 },
    #[error("key provider failure: {reason}")]
    Provider { reason: String },
}

/// Resolves or creates symmetric key material by alias.
///
/// Implementations are idempotent per alias: repeated calls with the same
/// alias and size resolve cross-compatible material, and concurrent
/// first-time calls for one alias must converge on a single created key.
pub trait KeyProvider: Send + Sync {
    fn load_key(&self, alias: &str, size: KeySize) -> Result<KeyMaterial, KeyError>;
}

impl<T: KeyProvider + ?Sized> KeyProvider for Arc<T> {
    fn load_key(&self, alias: &str, size: KeySize) -> Result<KeyMaterial, KeyError> {
        (**self).load_key(alias, size)
    }
}
