#![forbid(unsafe_code)]

//! In-memory reactive value synchronized with an external key/value store.
//!
//! # Design
//!
//! A [`PersistentValue<T>`] owns exactly one [`StorageKey`] for its lifetime.
//! On construction it hydrates from the store (falling back to the provided
//! default when the key is absent or fails to decode, without writing the
//! default back). [`set()`](PersistentValue::set) updates the in-memory cell
//! first — observers see the new value before `set` returns — and then writes
//! the encoded value to the store. Changes made to the same key by another
//! execution context arrive through the store's change subscription and are
//! decoded into the cell.
//!
//! # Invariants
//!
//! 1. `get()` always reflects the last successful `set` or the last
//!    successfully decoded external change, never a partially-applied or
//!    decode-failed value.
//! 2. A store-write failure is a non-fatal diagnostic; the in-memory value
//!    remains authoritative.
//! 3. Decode failures never propagate past this boundary: construction and
//!    external changes fall back / retain, logged at `warn`.
//!
//! # Failure Modes
//!
//! - **Store echoes same-context writes**: suppressed; observers still see
//!   exactly one notification per `set`.
//! - **External removal of the key**: the cell resets to the default value.

use std::cell::Cell;
use std::rc::Rc;

use tether_core::{
    DecodeError, KeyValueStore, ReactiveCell, StorageKey, StoreSubscription, Subscription,
};

/// A reactive value persisted under one key of an external store.
pub struct PersistentValue<T> {
    cell: ReactiveCell<T>,
    store: Rc<dyn KeyValueStore>,
    key: StorageKey,
    encode: Box<dyn Fn(&T) -> String>,
    /// Set around own store writes so a store that notifies same-context
    /// writers does not double-apply the value.
    writing: Rc<Cell<bool>>,
    _store_sub: StoreSubscription,
}

impl<T: Clone + 'static> PersistentValue<T> {
    /// Hydrate from `store` under `key`, falling back to `default` when the
    /// key is absent or `decode` fails. The default is never written back.
    pub fn new(
        store: Rc<dyn KeyValueStore>,
        key: StorageKey,
        default: T,
        encode: impl Fn(&T) -> String + 'static,
        decode: impl Fn(&str) -> Result<T, DecodeError> + 'static,
    ) -> Self {
        let initial = match store.read(&key) {
            Some(raw) => match decode(&raw) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "persisted value failed to decode; using default");
                    default.clone()
                }
            },
            None => default.clone(),
        };

        let cell = ReactiveCell::new(initial);
        let writing = Rc::new(Cell::new(false));

        let store_sub = store.subscribe(&key, {
            let cell = cell.clone();
            let writing = Rc::clone(&writing);
            let key = key.clone();
            Box::new(move |payload: Option<&str>| {
                if writing.get() {
                    return;
                }
                match payload {
                    Some(raw) => match decode(raw) {
                        Ok(value) => {
                            tracing::debug!(key = %key, "applying external store change");
                            cell.set(value);
                        }
                        Err(err) => {
                            tracing::warn!(key = %key, error = %err, "external change failed to decode; retaining value");
                        }
                    },
                    // Key removed externally: reset to the default.
                    None => cell.set(default.clone()),
                }
            })
        });

        Self {
            cell,
            store,
            key,
            encode: Box::new(encode),
            writing,
            _store_sub: store_sub,
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Update the value.
    ///
    /// The in-memory cell is updated first (observers are notified before
    /// `set` returns), then the encoded value is written to the store. A
    /// write failure is logged and otherwise ignored: the in-memory value
    /// stays authoritative.
    pub fn set(&self, value: T) {
        let encoded = (self.encode)(&value);
        self.cell.set(value);

        self.writing.set(true);
        let result = self.store.write(&self.key, &encoded);
        self.writing.set(false);

        if let Err(err) = result {
            tracing::warn!(key = %self.key, error = %err, "store write failed; in-memory value remains authoritative");
        }
    }

    /// The underlying reactive cell, for composition (e.g. as a debounce
    /// source).
    #[must_use]
    pub fn cell(&self) -> &ReactiveCell<T> {
        &self.cell
    }

    /// Observe value changes. See [`ReactiveCell::subscribe`].
    #[must_use]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.cell.subscribe(callback)
    }

    /// The storage key this value owns.
    #[must_use]
    pub fn key(&self) -> &StorageKey {
        &self.key
    }
}

#[cfg(feature = "json")]
impl<T> PersistentValue<T>
where
    T: Clone + serde::Serialize + serde::de::DeserializeOwned + 'static,
{
    /// [`new()`](Self::new) with a `serde_json` codec.
    pub fn json(store: Rc<dyn KeyValueStore>, key: StorageKey, default: T) -> Self {
        Self::new(
            store,
            key,
            default,
            |value| {
                serde_json::to_string(value).unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "value failed to serialize; persisting null");
                    "null".to_string()
                })
            },
            |raw| serde_json::from_str(raw).map_err(|err| DecodeError::new(err.to_string())),
        )
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PersistentValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentValue")
            .field("key", &self.key)
            .field("cell", &self.cell)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
