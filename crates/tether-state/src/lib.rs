#![forbid(unsafe_code)]

//! State-management primitives for single-threaded interactive applications.
//!
//! Three independent, composable components, each a self-contained reactive
//! unit with no shared internal state:
//!
//! - [`PersistentValue`]: synchronizes an in-memory reactive value with an
//!   external key/value store.
//! - [`DebouncedValue`]: delays propagation of a rapidly-changing value until
//!   it has been stable for a configured quiet period.
//! - [`RequestResource`]: manages the lifecycle of one asynchronous fetch
//!   operation, with generation-counter staleness guards.
//!
//! None of the three depends on another; they compose only at the call site
//! of a consuming application. All collaborators (store, scheduler, fetch
//! transport) are injected via the contracts in `tether-core`.

pub mod debounce;
pub mod persistent;
pub mod request;

pub use debounce::DebouncedValue;
pub use persistent::PersistentValue;
pub use request::{AbortSignal, FetchHandle, RequestResource, RequestState};
