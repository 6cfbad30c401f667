use std::{
    collections::HashMap,
    fs::{self, File},
    io::{ErrorKind, Read, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::instrument;

use sealstore_core::plain::{PlainOp, PlainStore, PlainStoreError};

/// JSON-file-backed plain store.
///
/// The whole document is rewritten on every commit through a temp file in
/// the same directory, so a crash mid-commit leaves the previous document
/// intact. Reads are served from an in-memory copy loaded at open time;
/// concurrent committers within one process serialize on that copy.
#[derive(Debug)]
pub struct FilePlainStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, String>>,
}

/// On-disk shape of the store file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    entries: HashMap<String, String>,
}

impl FilePlainStore {
    /// Opens the store at `path`, loading any existing document. A missing
    /// file is an empty store; an unreadable or invalid one is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PlainStoreError> {
        let path = path.into();
        let document = match File::open(&path) {
            Ok(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).map_err(storage_err)?;
                serde_json::from_slice::<Document>(&buf).map_err(storage_err)?
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Document::default(),
            Err(err) => return Err(storage_err(err)),
        };

        Ok(Self {
            path,
            cache: Mutex::new(document.entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, document: &Document) -> Result<(), PlainStoreError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(storage_err)?;

        let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
        let json = serde_json::to_vec(document).map_err(storage_err)?;
        tmp.write_all(&json).map_err(storage_err)?;
        tmp.flush().map_err(storage_err)?;
        tmp.persist(&self.path).map_err(|err| storage_err(err.error))?;
        Ok(())
    }
}

impl PlainStore for FilePlainStore {
    fn get_string(&self, key: &str) -> Option<String> {
        let cache = self.cache.lock().ok()?;
        cache.get(key).cloned()
    }

    fn contains(&self, key: &str) -> bool {
        self.cache
            .lock()
            .map(|cache| cache.contains_key(key))
            .unwrap_or(false)
    }

    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn commit(&self, ops: Vec<PlainOp>) -> Result<(), PlainStoreError> {
        let mut cache = self.cache.lock().map_err(|err| PlainStoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;

        // Apply to a scratch copy first; the cache only advances once the
        // document is durably on disk.
        let mut next = cache.clone();
        for op in ops {
            match op {
                PlainOp::Put { key, value } => {
                    next.insert(key, value);
                }
                PlainOp::Remove { key } => {
                    next.remove(&key);
                }
                PlainOp::Clear => next.clear(),
            }
        }

        let document = Document { entries: next };
        self.persist(&document)?;
        *cache = document.entries;
        Ok(())
    }
}

fn storage_err<E: ToString>(err: E) -> PlainStoreError {
    PlainStoreError::Storage {
        reason: err.to_string(),
    }
}
