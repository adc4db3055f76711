#![forbid(unsafe_code)]

//! Tether public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub mod prelude {
    pub use tether_core as core;
    pub use tether_state as state;

    pub use tether_core::{
        DecodeError, FetchError, KeyValueStore, ManualScheduler, MemoryStore, ReactiveCell,
        Scheduler, StorageKey, StoreChangeFn, StoreError, StoreSubscription, Subscription,
        TimerHandle,
    };
    pub use tether_state::{
        AbortSignal, DebouncedValue, FetchHandle, PersistentValue, RequestResource, RequestState,
    };

    #[cfg(feature = "state-persistence")]
    pub use tether_core::FileStore;
}
