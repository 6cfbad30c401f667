use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use sealstore_core::{
    key::KeyProvider,
    plain::{PlainOp, PlainStore, PlainStoreError},
};

use crate::{
    engine::{CryptoEngine, CryptoError},
    value::{ParseError, StoreValue},
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("bulk read is unsupported; use single-key typed accessors")]
    UnsupportedOperation,
    #[error("backing store: {0}")]
    Backing(#[from] PlainStoreError),
}

/// Encrypted view over a plain string key-value collaborator.
///
/// Values are encrypted before they reach the backing store and persisted
/// as base64 frames; key names stay plaintext. Reads are best-effort by
/// default: absent, corrupted, and tampered entries are indistinguishable
/// and resolve to the caller's fallback.
pub struct EncryptedStore<S: PlainStore, P: KeyProvider> {
    plain: S,
    engine: CryptoEngine<P>,
}

impl<S: PlainStore, P: KeyProvider> EncryptedStore<S, P> {
    pub fn new(plain: S, engine: CryptoEngine<P>) -> Self {
        Self { plain, engine }
    }

    /// Best-effort read: any failure along the
    /// lookup → base64 → decrypt → decode pipeline yields `default`.
    #[instrument(skip_all, fields(key))]
    pub fn get<T: StoreValue>(&self, key: &str, default: T) -> T {
        match self.try_get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default,
            Err(err) => {
                debug!(key, error = %err, "returning default for unreadable entry");
                default
            }
        }
    }

    /// Strict read surfacing decryption, provider, and decode failures.
    #[instrument(skip_all, fields(key))]
    pub fn try_get<T: StoreValue>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.plain.get_string(key) else {
            return Ok(None);
        };

        let frame = general_purpose::STANDARD
            .decode(raw.as_bytes())
            .map_err(|err| CryptoError::MalformedInput {
                reason: format!("base64: {err}"),
            })?;
        let plaintext = self.engine.decrypt_bytes(&frame)?;
        Ok(Some(T::decode(&plaintext)?))
    }

    /// Raw presence in the backing store, independent of decryptability.
    pub fn contains(&self, key: &str) -> bool {
        self.plain.contains(key)
    }

    /// Bulk reads are refused: returning raw entries would leak ciphertext
    /// structure, and bulk decryption would swallow per-entry failures.
    pub fn get_all(&self) -> Result<std::collections::HashMap<String, String>, StoreError> {
        Err(StoreError::UnsupportedOperation)
    }

    pub fn edit(&self) -> Editor<'_, S, P> {
        Editor {
            store: self,
            ops: Vec::new(),
        }
    }
}

enum PendingOp {
    Put { key: String, plaintext: Vec<u8> },
    Remove { key: String },
    Clear,
}

/// Accumulates mutations and applies them in one backing-store commit.
/// Queued operations are invisible to readers until then; dropping an
/// editor without committing discards its queue.
pub struct Editor<'a, S: PlainStore, P: KeyProvider> {
    store: &'a EncryptedStore<S, P>,
    ops: Vec<PendingOp>,
}

impl<S: PlainStore, P: KeyProvider> Editor<'_, S, P> {
    pub fn put<T: StoreValue>(&mut self, key: impl Into<String>, value: &T) -> &mut Self {
        self.ops.push(PendingOp::Put {
            key: key.into(),
            plaintext: value.encode(),
        });
        self
    }

    /// `None` removes the entry. The rule applies uniformly to every
    /// supported type.
    pub fn put_opt<T: StoreValue>(&mut self, key: impl Into<String>, value: Option<&T>) -> &mut Self {
        match value {
            Some(value) => self.put(key, value),
            None => self.remove(key),
        }
    }

    pub fn remove(&mut self, key: impl Into<String>) -> &mut Self {
        self.ops.push(PendingOp::Remove { key: key.into() });
        self
    }

    /// Queues removal of every existing entry. Later puts in the same
    /// batch still take effect: operations apply in queue order.
    pub fn clear(&mut self) -> &mut Self {
        self.ops.push(PendingOp::Clear);
        self
    }

    /// Encrypts queued puts and applies the whole batch as a single commit
    /// against the backing store. Consuming `self` makes post-commit
    /// mutation unrepresentable.
    #[instrument(skip_all)]
    pub fn commit(self) -> Result<(), StoreError> {
        let Editor { store, ops } = self;

        let mut staged = Vec::with_capacity(ops.len());
        for op in ops {
            match op {
                PendingOp::Put { key, plaintext } => {
                    let frame = store.engine.encrypt_bytes(&plaintext)?;
                    staged.push(PlainOp::Put {
                        key,
                        value: general_purpose::STANDARD.encode(frame),
                    });
                }
                PendingOp::Remove { key } => staged.push(PlainOp::Remove { key }),
                PendingOp::Clear => staged.push(PlainOp::Clear),
            }
        }

        store.plain.commit(staged)?;
        Ok(())
    }

    /// Fire-and-forget commit: failures are logged, not returned.
    pub fn apply(self) {
        if let Err(err) = self.commit() {
            warn!(error = %err, "encrypted store apply failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use sealstore_core::plain::InMemoryPlainStore;

    use super::*;
    use crate::{
        engine::EngineConfig, file_store::FilePlainStore, key_provider::InMemoryKeyProvider,
    };

    fn store() -> EncryptedStore<InMemoryPlainStore, InMemoryKeyProvider> {
        let engine = CryptoEngine::new(InMemoryKeyProvider::new(), EngineConfig::default());
        EncryptedStore::new(InMemoryPlainStore::new(), engine)
    }

    #[test]
    fn typed_values_round_trip() {
        let store = store();

        let mut editor = store.edit();
        editor
            .put("string", &"hello".to_string())
            .put("int", &7i32)
            .put("long", &(-9_000_000_000i64))
            .put("float", &2.25f32)
            .put("flag", &true);
        editor.commit().expect("commit");

        assert_eq!(store.get("string", String::new()), "hello");
        assert_eq!(store.get("int", 0i32), 7);
        assert_eq!(store.get("long", 0i64), -9_000_000_000);
        assert_eq!(store.get("float", 0.0f32), 2.25);
        assert!(store.get("flag", false));
    }

    #[test]
    fn string_set_round_trips_and_stores_no_plaintext() {
        let store = store();
        let roles: HashSet<String> = ["admin", "editor", "viewer"]
            .into_iter()
            .map(String::from)
            .collect();

        let mut editor = store.edit();
        editor.put("roles", &roles);
        editor.commit().expect("commit");

        let read: HashSet<String> = store.get("roles", HashSet::new());
        assert_eq!(read.len(), 3);
        assert_eq!(read, roles);

        let raw = store.plain.get_string("roles").expect("raw entry");
        for member in &roles {
            assert!(!raw.contains(member.as_str()), "plaintext must not leak");
        }
    }

    #[test]
    fn missing_keys_yield_default() {
        let store = store();
        assert_eq!(store.get("absent", 41i32), 41);
        assert_eq!(store.try_get::<i32>("absent").expect("strict read"), None);
    }

    #[test]
    fn corrupted_entries_yield_default() {
        let store = store();

        // Not base64 at all, then valid base64 of an undecryptable buffer.
        store
            .plain
            .commit(vec![
                PlainOp::Put {
                    key: "garbled".into(),
                    value: "not base64 !!".into(),
                },
                PlainOp::Put {
                    key: "forged".into(),
                    value: general_purpose::STANDARD.encode([0u8; 40]),
                },
            ])
            .expect("inject corruption");

        assert_eq!(store.get("garbled", 5i32), 5);
        assert_eq!(store.get("forged", 5i32), 5);

        assert!(store.try_get::<i32>("garbled").is_err());
        assert!(store.try_get::<i32>("forged").is_err());
    }

    #[test]
    fn tampered_entries_are_indistinguishable_from_missing() {
        let store = store();
        let mut editor = store.edit();
        editor.put("token", &"original".to_string());
        editor.commit().expect("commit");

        let raw = store.plain.get_string("token").expect("raw entry");
        let mut frame = general_purpose::STANDARD.decode(raw).expect("base64");
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        store
            .plain
            .commit(vec![PlainOp::Put {
                key: "token".into(),
                value: general_purpose::STANDARD.encode(frame),
            }])
            .expect("inject tamper");

        assert_eq!(store.get("token", "fallback".to_string()), "fallback");
        assert!(store.contains("token"), "raw presence is unaffected");
    }

    #[test]
    fn cross_type_reads_yield_default() {
        let store = store();
        let mut editor = store.edit();
        editor.put("count", &3i32);
        editor.commit().expect("commit");

        assert_eq!(store.get("count", "text".to_string()), "text");
        assert!(matches!(
            store.try_get::<String>("count"),
            Err(StoreError::Parse(_))
        ));
    }

    #[test]
    fn put_opt_none_removes() {
        let store = store();
        let mut editor = store.edit();
        editor.put("ephemeral", &true);
        editor.commit().expect("commit");
        assert!(store.contains("ephemeral"));

        let mut editor = store.edit();
        editor.put_opt::<bool>("ephemeral", None);
        editor.commit().expect("commit");
        assert!(!store.contains("ephemeral"));
    }

    #[test]
    fn clear_applies_in_queue_order() {
        let store = store();
        let mut editor = store.edit();
        editor.put("old", &1i32);
        editor.commit().expect("commit");

        let mut editor = store.edit();
        editor.clear().put("new", &2i32);
        editor.commit().expect("commit");

        assert!(!store.contains("old"));
        assert_eq!(store.get("new", 0i32), 2);
    }

    #[test]
    fn get_all_is_unsupported() {
        let store = store();
        assert!(matches!(
            store.get_all(),
            Err(StoreError::UnsupportedOperation)
        ));
    }

    #[test]
    fn full_stack_round_trip_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prefs.json");
        let provider = InMemoryKeyProvider::new();

        {
            let engine = CryptoEngine::new(provider.clone(), EngineConfig::default());
            let store = EncryptedStore::new(FilePlainStore::open(&path).expect("open"), engine);
            let mut editor = store.edit();
            editor.put("token", &"opaque-bearer".to_string());
            editor.commit().expect("commit");
        }

        let engine = CryptoEngine::new(provider, EngineConfig::default());
        let store = EncryptedStore::new(FilePlainStore::open(&path).expect("reopen"), engine);
        assert_eq!(store.get("token", String::new()), "opaque-bearer");
    }

    #[test]
    fn commit_failures_propagate() {
        struct RefusingStore;

        impl PlainStore for RefusingStore {
            fn get_string(&self, _: &str) -> Option<String> {
                None
            }

            fn commit(&self, _: Vec<PlainOp>) -> Result<(), PlainStoreError> {
                Err(PlainStoreError::Storage {
                    reason: "read-only volume".into(),
                })
            }
        }

        let engine = CryptoEngine::new(InMemoryKeyProvider::new(), EngineConfig::default());
        let store = EncryptedStore::new(RefusingStore, engine);

        let mut editor = store.edit();
        editor.put("k", &1i32);
        let err = editor.commit().expect_err("backing store refused");
        assert!(matches!(err, StoreError::Backing(_)));
    }
}
