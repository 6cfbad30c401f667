use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

use sealstore_core::key::{KeyError, KeyMaterial, KeyProvider, KeySize};

/// Nonce size required by AES-GCM; frames declaring any other size are
/// rejected as malformed.
pub const NONCE_LEN: usize = 12;
/// GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

const LEN_PREFIX: usize = 4;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key unavailable: {0}")]
    KeyUnavailable(#[from] KeyError),
    #[error("malformed frame: {reason}")]
    MalformedInput { reason: String },
    #[error("authentication failed: frame rejected")]
    AuthenticationFailure,
    #[error("cipher failure: {reason}")]
    CryptoFailure { reason: String },
}

/// Alias and key size one engine encrypts under. Engines are constructed
/// explicitly from a config, so independently configured engines can
/// coexist in one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub alias: String,
    pub key_size: KeySize,
}

impl EngineConfig {
    pub fn new(alias: impl Into<String>, key_size: KeySize) -> Self {
        Self {
            alias: alias.into(),
            key_size,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alias: "sealstore".to_string(),
            key_size: KeySize::Bits256,
        }
    }
}

/// Stateless authenticated-encryption engine over a key provider.
///
/// Output frames are self-describing: a 4-byte big-endian nonce length,
/// the nonce, then ciphertext concatenated with the GCM tag.
pub struct CryptoEngine<P: KeyProvider> {
    provider: P,
    config: EngineConfig,
}

impl<P: KeyProvider> CryptoEngine<P> {
    pub fn new(provider: P, config: EngineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Optional-value wrapper preserving the pass-through contract:
    /// `None` in, `None` out, with no key access.
    pub fn encrypt(&self, plaintext: Option<&[u8]>) -> Result<Option<Vec<u8>>, CryptoError> {
        match plaintext {
            None => Ok(None),
            Some(p) => self.encrypt_bytes(p).map(Some),
        }
    }

    /// `None` in, `None` out; see [`CryptoEngine::encrypt`].
    pub fn decrypt(&self, frame: Option<&[u8]>) -> Result<Option<Vec<u8>>, CryptoError> {
        match frame {
            None => Ok(None),
            Some(f) => self.decrypt_bytes(f).map(Some),
        }
    }

    /// Encrypts under a fresh random nonce. Empty input maps to empty
    /// output without touching the key provider.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if plaintext.is_empty() {
            return Ok(Vec::new());
        }

        let key = self
            .provider
            .load_key(&self.config.alias, self.config.key_size)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = seal(&key, &nonce, plaintext)?;

        let mut frame = Vec::with_capacity(LEN_PREFIX + NONCE_LEN + ciphertext.len());
        frame.extend_from_slice(&(NONCE_LEN as u32).to_be_bytes());
        frame.extend_from_slice(&nonce);
        frame.extend_from_slice(&ciphertext);
        Ok(frame)
    }

    /// Parses and opens a frame. Structural problems report
    /// `MalformedInput`; a frame that parses but fails tag verification
    /// reports `AuthenticationFailure`.
    pub fn decrypt_bytes(&self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let (nonce, ciphertext) = split_frame(frame)?;
        let key = self
            .provider
            .load_key(&self.config.alias, self.config.key_size)?;
        open(&key, nonce, ciphertext)
    }
}

fn split_frame(frame: &[u8]) -> Result<(&[u8], &[u8]), CryptoError> {
    if frame.len() < LEN_PREFIX {
        return Err(malformed(format!(
            "{} bytes is shorter than the length prefix",
            frame.len()
        )));
    }

    let mut declared_bytes = [0u8; LEN_PREFIX];
    declared_bytes.copy_from_slice(&frame[..LEN_PREFIX]);
    let declared = u32::from_be_bytes(declared_bytes) as usize;
    if declared != NONCE_LEN {
        return Err(malformed(format!(
            "declared nonce length {declared}, expected {NONCE_LEN}"
        )));
    }

    let body = &frame[LEN_PREFIX..];
    if body.len() < declared + TAG_LEN {
        return Err(malformed(format!(
            "{} bytes after prefix cannot hold nonce and tag",
            body.len()
        )));
    }

    Ok((&body[..declared], &body[declared..]))
}

fn seal(key: &KeyMaterial, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    match key.bytes().len() {
        16 => Aes128Gcm::new_from_slice(key.bytes())
            .map_err(init_err)?
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(seal_err),
        32 => Aes256Gcm::new_from_slice(key.bytes())
            .map_err(init_err)?
            .encrypt(Nonce::from_slice(nonce), plaintext)
            .map_err(seal_err),
        other => Err(CryptoError::CryptoFailure {
            reason: format!("unsupported key length: {other} bytes"),
        }),
    }
}

fn open(key: &KeyMaterial, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    match key.bytes().len() {
        16 => Aes128Gcm::new_from_slice(key.bytes())
            .map_err(init_err)?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailure),
        32 => Aes256Gcm::new_from_slice(key.bytes())
            .map_err(init_err)?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailure),
        other => Err(CryptoError::CryptoFailure {
            reason: format!("unsupported key length: {other} bytes"),
        }),
    }
}

fn malformed(reason: String) -> CryptoError {
    CryptoError::MalformedInput { reason }
}

fn init_err<E: std::fmt::Display>(err: E) -> CryptoError {
    CryptoError::CryptoFailure {
        reason: format!("cipher init failed: {err}"),
    }
}

fn seal_err<E: std::fmt::Display>(err: E) -> CryptoError {
    CryptoError::CryptoFailure {
        reason: format!("encrypt failed: {err}"),
    }
}
