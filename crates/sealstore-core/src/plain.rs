use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use thiserror::Error;

/// Errors produced by plain key-value collaborators.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlainStoreError {
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// One staged mutation against a plain store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlainOp {
    Put { key: String, value: String },
    Remove { key: String },
    Clear,
}

/// Flat string-keyed persistence facility that encrypted stores wrap.
///
/// Callers stage a batch of operations and apply it through a single
/// `commit`; durability and commit ordering across concurrent committers
/// are whatever the implementation provides.
pub trait PlainStore: Send + Sync {
    fn get_string(&self, key: &str) -> Option<String>;

    fn contains(&self, key: &str) -> bool {
        self.get_string(key).is_some()
    }

    /// Applies the batch in order as one commit.
    fn commit(&self, ops: Vec<PlainOp>) -> Result<(), PlainStoreError>;
}

/// In-memory plain store for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPlainStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryPlainStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlainStore for InMemoryPlainStore {
    fn get_string(&self, key: &str) -> Option<String> {
        let map = self.inner.lock().ok()?;
        map.get(key).cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.inner
            .lock()
            .map(|map| map.contains_key(key))
            .unwrap_or(false)
    }

    fn commit(&self, ops: Vec<PlainOp>) -> Result<(), PlainStoreError> {
        let mut map = self.inner.lock().map_err(|err| PlainStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        for op in ops {
            match op {
                PlainOp::Put { key, value } => {
                    map.insert(key, value);
                }
                PlainOp::Remove { key } => {
                    map.remove(&key);
                }
                PlainOp::Clear => map.clear(),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_applies_ops_in_order() {
        let store = InMemoryPlainStore::new();
        store
            .commit(vec![
                PlainOp::Put {
                    key: "a".into(),
                    value: "1".into(),
                },
                PlainOp::Put {
                    key: "b".into(),
                    value: "2".into(),
                },
                PlainOp::Remove { key: "a".into() },
            ])
            .expect("commit");

        assert!(!store.contains("a"));
        assert_eq!(store.get_string("b").as_deref(), Some("2"));
    }

    #[test]
    fn clear_wipes_every_entry() {
        let store = InMemoryPlainStore::new();
        store
            .commit(vec![
                PlainOp::Put {
                    key: "a".into(),
                    value: "1".into(),
                },
                PlainOp::Clear,
                PlainOp::Put {
                    key: "c".into(),
                    value: "3".into(),
                },
            ])
            .expect("commit");

        assert!(!store.contains("a"));
        assert_eq!(store.get_string("c").as_deref(), Some("3"));
    }
}
