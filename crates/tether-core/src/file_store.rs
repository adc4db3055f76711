#![forbid(unsafe_code)]

//! JSON file-backed [`KeyValueStore`] for cross-session persistence.
//!
//! All keys live in a single JSON document (`{"key": "raw value", ...}`)
//! rewritten on every write. There is no cross-process change feed:
//! [`subscribe()`](KeyValueStore::subscribe) returns an inert subscription.
//! Embedders that need to observe foreign writes must poll `read()` and
//! accept the latency trade-off; the component contract is unchanged.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::store::{KeyValueStore, StorageKey, StoreChangeFn, StoreSubscription};

/// File-backed store holding all keys in one JSON object.
pub struct FileStore {
    path: PathBuf,
    entries: RefCell<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or create) a store at `path`.
    ///
    /// A missing file starts empty; an unreadable or malformed file is an
    /// error, so a corrupt document is surfaced rather than silently
    /// truncated on the next write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => {
                serde_json::from_str(&raw).map_err(|err| StoreError::Codec(err.to_string()))?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(StoreError::Io(err.to_string())),
        };
        Ok(Self {
            path,
            entries: RefCell::new(entries),
        })
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StoreError> {
        let raw = serde_json::to_string(&*self.entries.borrow())
            .map_err(|err| StoreError::Codec(err.to_string()))?;
        fs::write(&self.path, raw).map_err(|err| StoreError::Io(err.to_string()))
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &StorageKey) -> Option<String> {
        self.entries.borrow().get(key.as_str()).cloned()
    }

    fn write(&self, key: &StorageKey, value: &str) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.as_str().to_string(), value.to_string());
        self.flush()
    }

    fn subscribe(&self, key: &StorageKey, _on_change: StoreChangeFn) -> StoreSubscription {
        tracing::debug!(key = %key, "file store has no change feed; subscription is inert");
        StoreSubscription::inert()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
