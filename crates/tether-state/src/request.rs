#![forbid(unsafe_code)]

//! Lifecycle management for one asynchronous fetch operation.
//!
//! # Design
//!
//! A [`RequestResource<T, D>`] owns a single [`RequestState<T>`] cell and a
//! fetch transport. Every fetch initiation (construction, dependency change,
//! manual [`refetch()`](RequestResource::refetch)) bumps a monotonically
//! increasing generation counter and hands the transport a [`FetchHandle`]
//! tagged with that generation. When the transport settles the handle, the
//! result is applied only if the handle's generation still matches the
//! resource's current one; otherwise it is discarded silently. Overlapping
//! fetches therefore never let a stale, slower response overwrite a newer
//! one: last-initiated-that-completes-while-current wins, not
//! last-to-complete.
//!
//! Fetches are not forcibly aborted at the transport level. Each handle
//! carries an [`AbortSignal`] flipped when its generation is superseded or
//! the resource is dropped; transports may observe it, but correctness does
//! not depend on it.
//!
//! # Invariants
//!
//! 1. Transitions never skip `Loading` when initiating a fetch from `Idle`,
//!    `Success`, or `Failure`.
//! 2. A settled handle whose generation is stale mutates nothing.
//! 3. Drop bumps the generation one final time; no in-flight result after
//!    drop reaches any observer (the handle also only holds a weak
//!    reference).
//! 4. Dependency changes are detected by value comparison; an equal
//!    dependency value does not re-fetch.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tether_core::{FetchError, ReactiveCell, Subscription};
use web_time::Instant;

/// The observable lifecycle state of one fetch operation.
#[derive(Debug, Clone)]
pub enum RequestState<T> {
    /// No fetch has been initiated yet.
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The most recent current fetch resolved.
    Success { data: T, fetched_at: Instant },
    /// The most recent current fetch rejected.
    Failure { error: FetchError, failed_at: Instant },
}

impl<T> RequestState<T> {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Success or Failure.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failure { .. })
    }

    /// The data of a `Success`, if that is the current state.
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// The error of a `Failure`, if that is the current state.
    #[must_use]
    pub fn error(&self) -> Option<&FetchError> {
        match self {
            Self::Failure { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Cooperative cancellation flag forwarded to fetch transports.
///
/// Flipped when the owning fetch generation is superseded or the resource is
/// dropped. Observing it is optional; staleness is enforced at settle time
/// regardless.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Rc<Cell<bool>>,
}

impl AbortSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.get()
    }

    fn abort(&self) {
        self.aborted.set(true);
    }
}

struct ResourceInner<T> {
    state: ReactiveCell<RequestState<T>>,
    generation: u64,
    /// Abort flag of the current generation's in-flight fetch.
    abort: AbortSignal,
}

/// Completion handle for one fetch initiation.
///
/// The transport calls [`resolve()`](FetchHandle::resolve) or
/// [`reject()`](FetchHandle::reject) exactly once, in the same turn or any
/// later turn. Settling a stale handle is a silent no-op.
pub struct FetchHandle<T> {
    inner: Weak<RefCell<ResourceInner<T>>>,
    generation: u64,
    abort: AbortSignal,
}

impl<T: 'static> FetchHandle<T> {
    /// Apply a successful result, if this handle is still current.
    pub fn resolve(self, data: T) {
        self.settle(Ok(data));
    }

    /// Apply a failure, if this handle is still current.
    pub fn reject(self, error: FetchError) {
        self.settle(Err(error));
    }

    /// The cancellation flag for this initiation.
    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Whether this handle has been superseded (or the resource dropped).
    #[must_use]
    pub fn is_stale(&self) -> bool {
        match self.inner.upgrade() {
            Some(inner) => inner.borrow().generation != self.generation,
            None => true,
        }
    }

    fn settle(self, outcome: Result<T, FetchError>) {
        let Some(inner) = self.inner.upgrade() else {
            tracing::trace!(generation = self.generation, "fetch settled after resource drop; discarded");
            return;
        };
        let state = {
            let inner = inner.borrow();
            if inner.generation != self.generation {
                tracing::trace!(
                    stale = self.generation,
                    current = inner.generation,
                    "stale fetch result discarded"
                );
                return;
            }
            inner.state.clone()
        };
        let now = Instant::now();
        match outcome {
            Ok(data) => {
                tracing::debug!(generation = self.generation, "request.success");
                state.set(RequestState::Success {
                    data,
                    fetched_at: now,
                });
            }
            Err(error) => {
                tracing::debug!(generation = self.generation, error = %error, "request.failure");
                state.set(RequestState::Failure {
                    error,
                    failed_at: now,
                });
            }
        }
    }
}

impl<T> std::fmt::Debug for FetchHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchHandle")
            .field("generation", &self.generation)
            .field("aborted", &self.abort.is_aborted())
            .finish_non_exhaustive()
    }
}

/// Manages the pending/success/error lifecycle of one asynchronous fetch.
///
/// `D` is the dependency value re-fetches key off; see
/// [`update_deps()`](RequestResource::update_deps).
pub struct RequestResource<T, D> {
    inner: Rc<RefCell<ResourceInner<T>>>,
    fetch: Rc<dyn Fn(FetchHandle<T>)>,
    deps: RefCell<D>,
}

impl<T: Clone + 'static, D: PartialEq> RequestResource<T, D> {
    /// Construct and immediately initiate the first fetch.
    ///
    /// The transport receives a [`FetchHandle`] per initiation and settles it
    /// whenever the operation completes.
    #[must_use]
    pub fn new(fetch: impl Fn(FetchHandle<T>) + 'static, deps: D) -> Self {
        let resource = Self {
            inner: Rc::new(RefCell::new(ResourceInner {
                state: ReactiveCell::new(RequestState::Idle),
                generation: 0,
                abort: AbortSignal::new(),
            })),
            fetch: Rc::new(fetch),
            deps: RefCell::new(deps),
        };
        resource.start();
        resource
    }

    /// Clone of the current request state.
    #[must_use]
    pub fn state(&self) -> RequestState<T> {
        self.inner.borrow().state.get()
    }

    /// A handle to the state cell, for composition and observation. The cell
    /// outlives the resource, but no transition is applied after drop.
    #[must_use]
    pub fn state_cell(&self) -> ReactiveCell<RequestState<T>> {
        self.inner.borrow().state.clone()
    }

    /// Observe state transitions. See [`ReactiveCell::subscribe`].
    #[must_use]
    pub fn subscribe(&self, callback: impl Fn(&RequestState<T>) + 'static) -> Subscription {
        self.inner.borrow().state.subscribe(callback)
    }

    /// Current generation counter (diagnostic).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.borrow().generation
    }

    /// Manually initiate a new fetch, superseding any in-flight one.
    ///
    /// Idempotent with respect to concurrent calls: each call starts at most
    /// one new generation, each superseding the prior.
    pub fn refetch(&self) {
        self.start();
    }

    /// Replace the dependency value; initiates a new fetch only when the new
    /// value compares unequal to the current one.
    pub fn update_deps(&self, deps: D) {
        let changed = *self.deps.borrow() != deps;
        if changed {
            *self.deps.borrow_mut() = deps;
            self.start();
        }
    }

    /// Read the current dependency value.
    pub fn with_deps<R>(&self, f: impl FnOnce(&D) -> R) -> R {
        f(&self.deps.borrow())
    }

    fn start(&self) {
        let (handle, state) = {
            let mut inner = self.inner.borrow_mut();
            inner.abort.abort(); // supersede any in-flight fetch
            inner.generation += 1;
            inner.abort = AbortSignal::new();
            tracing::debug!(generation = inner.generation, "request.loading");
            let handle = FetchHandle {
                inner: Rc::downgrade(&self.inner),
                generation: inner.generation,
                abort: inner.abort.clone(),
            };
            (handle, inner.state.clone())
        };
        // Loading is published before the transport runs, so even a
        // synchronously-settling transport never skips it.
        state.set(RequestState::Loading);
        (self.fetch)(handle);
    }
}

impl<T, D> Drop for RequestResource<T, D> {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.abort.abort();
        // Final bump: no in-flight completion can match again.
        inner.generation += 1;
    }
}

impl<T: std::fmt::Debug, D> std::fmt::Debug for RequestResource<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("RequestResource")
            .field("state", &inner.state)
            .field("generation", &inner.generation)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Transport double that parks every handle for manual settlement.
    fn parking_transport<T: 'static>() -> (
        impl Fn(FetchHandle<T>) + 'static,
        Rc<RefCell<Vec<FetchHandle<T>>>>,
    ) {
        let handles: Rc<RefCell<Vec<FetchHandle<T>>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&handles);
        (move |h| sink.borrow_mut().push(h), handles)
    }

    #[test]
    fn construction_enters_loading_via_idle() {
        let (fetch, handles) = parking_transport::<u32>();
        let resource = RequestResource::new(fetch, 0u32);

        assert!(resource.state().is_loading());
        assert_eq!(resource.generation(), 1);
        assert_eq!(handles.borrow().len(), 1);
    }

    #[test]
    fn resolve_applies_success_with_timestamp() {
        let (fetch, handles) = parking_transport::<u32>();
        let before = Instant::now();
        let resource = RequestResource::new(fetch, 0u32);

        let handle = handles.borrow_mut().remove(0);
        handle.resolve(7);

        match resource.state() {
            RequestState::Success { data, fetched_at } => {
                assert_eq!(data, 7);
                assert!(fetched_at >= before);
            }
            other => panic!("expected Success, got {other:?}"),
        }
    }

    #[test]
    fn reject_applies_failure() {
        let (fetch, handles) = parking_transport::<u32>();
        let resource = RequestResource::new(fetch, 0u32);

        let handle = handles.borrow_mut().remove(0);
        handle.reject(FetchError::new("boom"));

        assert_eq!(
            resource.state().error().map(FetchError::message),
            Some("boom")
        );
    }

    #[test]
    fn stale_generation_result_is_discarded() {
        let (fetch, handles) = parking_transport::<u32>();
        let resource = RequestResource::new(fetch, 0u32);

        // Two dependency changes before the first fetch settles.
        resource.update_deps(1);
        resource.update_deps(2);
        assert_eq!(handles.borrow().len(), 3);
        assert_eq!(resource.generation(), 3);

        let first = handles.borrow_mut().remove(0);
        let second = handles.borrow_mut().remove(0);
        assert!(first.is_stale());

        // Slow stale responses land after the latest initiation.
        first.resolve(10);
        assert!(resource.state().is_loading());
        second.resolve(20);
        assert!(resource.state().is_loading());

        // Only the final generation's result is ever applied.
        let third = handles.borrow_mut().remove(0);
        third.resolve(30);
        assert_eq!(resource.state().data().copied(), Some(30));
    }

    #[test]
    fn last_current_wins_not_last_to_complete() {
        let (fetch, handles) = parking_transport::<&'static str>();
        let resource = RequestResource::new(fetch, 0u32);

        resource.refetch();
        let stale = handles.borrow_mut().remove(0);
        let current = handles.borrow_mut().remove(0);

        // The newer initiation completes first...
        current.resolve("new");
        assert_eq!(resource.state().data().copied(), Some("new"));

        // ...and the older, slower one cannot overwrite it afterwards.
        stale.resolve("old");
        assert_eq!(resource.state().data().copied(), Some("new"));
    }

    #[test]
    fn equal_deps_do_not_refetch() {
        let (fetch, handles) = parking_transport::<u32>();
        let resource = RequestResource::new(fetch, 5u32);

        resource.update_deps(5);
        assert_eq!(handles.borrow().len(), 1);
        assert_eq!(resource.generation(), 1);
    }

    #[test]
    fn refetch_from_success_transitions_to_loading_immediately() {
        let (fetch, handles) = parking_transport::<u32>();
        let resource = RequestResource::new(fetch, 0u32);

        handles.borrow_mut().remove(0).resolve(1);
        assert!(resource.state().is_terminal());

        resource.refetch();
        assert!(resource.state().is_loading());

        // No stale data leaks into the new outcome.
        handles.borrow_mut().remove(0).reject(FetchError::new("down"));
        match resource.state() {
            RequestState::Failure { error, .. } => assert_eq!(error.message(), "down"),
            other => panic!("expected Failure, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_refetches_each_supersede_the_prior() {
        let (fetch, handles) = parking_transport::<u32>();
        let resource = RequestResource::new(fetch, 0u32);

        resource.refetch();
        resource.refetch();
        assert_eq!(resource.generation(), 3);
        assert_eq!(handles.borrow().len(), 3);

        // Only the last handle is current.
        let mut parked = handles.borrow_mut();
        assert!(parked[0].is_stale());
        assert!(parked[1].is_stale());
        assert!(!parked[2].is_stale());
        drop(parked);
    }

    #[test]
    fn drop_renders_in_flight_completion_inert() {
        let (fetch, handles) = parking_transport::<u32>();
        let resource = RequestResource::new(fetch, 0u32);

        let observed = Rc::new(RefCell::new(Vec::new()));
        let observed_clone = Rc::clone(&observed);
        let state_cell = resource.state_cell();
        let _sub = state_cell.subscribe(move |s: &RequestState<u32>| {
            observed_clone.borrow_mut().push(s.data().copied());
        });

        drop(resource);

        let handle = handles.borrow_mut().remove(0);
        handle.resolve(42);

        // No externally observable mutation after drop.
        assert!(observed.borrow().is_empty());
        assert!(state_cell.get().is_loading());
    }

    #[test]
    fn supersession_flips_abort_signal() {
        let (fetch, handles) = parking_transport::<u32>();
        let resource = RequestResource::new(fetch, 0u32);

        let first_signal = handles.borrow()[0].abort_signal();
        assert!(!first_signal.is_aborted());

        resource.update_deps(1);
        assert!(first_signal.is_aborted());

        let second_signal = handles.borrow()[1].abort_signal();
        assert!(!second_signal.is_aborted());

        drop(resource);
        assert!(second_signal.is_aborted());
    }

    #[test]
    fn synchronous_transport_still_passes_through_loading() {
        let seen = Rc::new(RefCell::new(Vec::new()));

        // Transport that settles within the initiation turn.
        let resource = RequestResource::new(|h: FetchHandle<u32>| h.resolve(1), 0u32);
        assert_eq!(resource.state().data().copied(), Some(1));

        let seen_clone = Rc::clone(&seen);
        let _sub = resource.subscribe(move |s: &RequestState<u32>| {
            seen_clone
                .borrow_mut()
                .push(if s.is_loading() { "loading" } else { "terminal" });
        });

        resource.refetch();
        assert_eq!(*seen.borrow(), vec!["loading", "terminal"]);
    }
}
