#![forbid(unsafe_code)]

//! Key/value store contract and an in-memory implementation.
//!
//! # Design
//!
//! The persistent store is a shared, externally-owned collaborator; tether
//! components only read and write through [`KeyValueStore`] and never assume
//! exclusive access. The store exposes a change-notification subscription so
//! a component can observe mutations made by *other* execution contexts
//! (another tab, another process) on the key it owns.
//!
//! [`MemoryStore`] is the deterministic in-crate implementation. Ordinary
//! [`write()`](KeyValueStore::write) calls are silent to same-context
//! subscribers (mirroring browser storage events, which fire only in other
//! tabs); tests simulate a foreign context with
//! [`external_write()`](MemoryStore::external_write) and
//! [`external_remove()`](MemoryStore::external_remove), which do notify.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::StoreError;

/// Opaque string identifying one slot in an external key/value store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StorageKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for StorageKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Change callback: receives the new raw value, or `None` when the key was
/// removed.
pub type StoreChangeFn = Box<dyn Fn(Option<&str>)>;

/// External key/value store contract.
///
/// Values are raw strings; (de)serialization is the caller's concern.
pub trait KeyValueStore {
    /// Read the raw value for `key`, or `None` if absent.
    fn read(&self, key: &StorageKey) -> Option<String>;

    /// Write a raw value. A failure is non-fatal to callers: the in-memory
    /// state they maintain remains authoritative.
    fn write(&self, key: &StorageKey, value: &str) -> Result<(), StoreError>;

    /// Subscribe to changes of `key` made by other execution contexts.
    ///
    /// Stores with no native change feed may return
    /// [`StoreSubscription::inert()`]; callers then fall back to whatever
    /// polling policy they document.
    fn subscribe(&self, key: &StorageKey, on_change: StoreChangeFn) -> StoreSubscription;
}

/// RAII guard for a store change subscription; dropping it unsubscribes.
pub struct StoreSubscription {
    _slot: Rc<dyn Any>,
}

impl StoreSubscription {
    /// Wrap the strong reference a store implementation keeps weakly.
    #[must_use]
    pub fn new(slot: Rc<dyn Any>) -> Self {
        Self { _slot: slot }
    }

    /// A subscription that never fires, for stores without a change feed.
    #[must_use]
    pub fn inert() -> Self {
        Self { _slot: Rc::new(()) }
    }
}

impl fmt::Debug for StoreSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSubscription").finish_non_exhaustive()
    }
}

struct WatchSlot {
    key: StorageKey,
    on_change: StoreChangeFn,
}

struct MemoryStoreInner {
    entries: HashMap<String, String>,
    watchers: Vec<Weak<WatchSlot>>,
}

/// `HashMap`-backed [`KeyValueStore`] with simulated cross-context change
/// notification.
pub struct MemoryStore {
    inner: RefCell<MemoryStoreInner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(MemoryStoreInner {
                entries: HashMap::new(),
                watchers: Vec::new(),
            }),
        }
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Write as if from another execution context: stores the value and
    /// notifies same-store subscribers of `key`.
    pub fn external_write(&self, key: &StorageKey, value: &str) {
        self.inner
            .borrow_mut()
            .entries
            .insert(key.as_str().to_string(), value.to_string());
        self.notify(key, Some(value));
    }

    /// Remove as if from another execution context: deletes the entry and
    /// notifies subscribers of `key` with `None`.
    pub fn external_remove(&self, key: &StorageKey) {
        self.inner.borrow_mut().entries.remove(key.as_str());
        self.notify(key, None);
    }

    fn notify(&self, key: &StorageKey, payload: Option<&str>) {
        // Snapshot live watchers outside the borrow: callbacks may read or
        // write the store.
        let live: Vec<Rc<WatchSlot>> = {
            let mut inner = self.inner.borrow_mut();
            inner.watchers.retain(|w| w.strong_count() > 0);
            inner
                .watchers
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|slot| slot.key == *key)
                .collect()
        };
        for slot in live {
            (slot.on_change)(payload);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &StorageKey) -> Option<String> {
        self.inner.borrow().entries.get(key.as_str()).cloned()
    }

    fn write(&self, key: &StorageKey, value: &str) -> Result<(), StoreError> {
        self.inner
            .borrow_mut()
            .entries
            .insert(key.as_str().to_string(), value.to_string());
        Ok(())
    }

    fn subscribe(&self, key: &StorageKey, on_change: StoreChangeFn) -> StoreSubscription {
        let slot = Rc::new(WatchSlot {
            key: key.clone(),
            on_change,
        });
        self.inner.borrow_mut().watchers.push(Rc::downgrade(&slot));
        StoreSubscription::new(slot)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
