#![forbid(unsafe_code)]

//! Core reactive primitives and collaborator contracts for tether.
//!
//! This crate provides the building blocks the state primitives in
//! `tether-state` are assembled from:
//!
//! - [`ReactiveCell`]: a shared mutable slot with synchronous change
//!   notification via subscriber callbacks.
//! - [`Subscription`]: RAII guard that automatically unsubscribes on drop.
//! - [`KeyValueStore`] / [`Scheduler`]: injectable collaborator contracts for
//!   persistent storage and timer scheduling.
//! - [`MemoryStore`] / [`ManualScheduler`]: deterministic in-crate
//!   implementations of those contracts for tests and embedders.
//! - The error taxonomy: [`DecodeError`], [`StoreError`], [`FetchError`].
//!
//! # Architecture
//!
//! Everything here assumes single-threaded cooperative execution.
//! `ReactiveCell<T>` uses `Rc<RefCell<..>>` for shared ownership; subscribers
//! are stored as `Weak` callbacks and cleaned up lazily during notification.
//! Observer notifications happen synchronously within the turn a mutation
//! completes; there is no batching or reordering.

pub mod cell;
pub mod error;
pub mod sched;
pub mod store;

#[cfg(feature = "state-persistence")]
pub mod file_store;

pub use cell::{ReactiveCell, Subscription};
pub use error::{DecodeError, FetchError, StoreError};
pub use sched::{ManualScheduler, Scheduler, TimerHandle};
pub use store::{KeyValueStore, MemoryStore, StorageKey, StoreChangeFn, StoreSubscription};

#[cfg(feature = "state-persistence")]
pub use file_store::FileStore;
