#![forbid(unsafe_code)]

//! Shared, version-tracked value slot with synchronous change notification.
//!
//! # Design
//!
//! [`ReactiveCell<T>`] wraps a value in shared, reference-counted storage.
//! Observers register callbacks via [`subscribe()`](ReactiveCell::subscribe)
//! and receive exactly one notification per [`set()`](ReactiveCell::set),
//! synchronously, before `set` returns. Cloning a `ReactiveCell` creates a
//! new handle to the **same** slot.
//!
//! # Invariants
//!
//! 1. Every `set` triggers exactly one notification to each live subscriber,
//!    within the same scheduling turn it was issued.
//! 2. Subscribers are notified in registration order.
//! 3. Version increments by exactly 1 per `set`.
//! 4. Dropping a [`Subscription`] removes the callback before the next
//!    notification cycle.
//!
//! # Failure Modes
//!
//! - **Re-entrant `set` from a notification callback**: panics on the
//!   `RefCell` borrow. Callbacks may freely *read* the cell (`get`/`with`)
//!   but must defer further writes to the same cell.
//! - **Subscriber dropped mid-notification cycle**: dead subscribers are
//!   pruned lazily at the start of each notification and never invoked.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Heap slot keeping one subscriber callback alive.
///
/// The cell holds only a `Weak` to this; the returned [`Subscription`] owns
/// the strong count, so dropping the guard kills the callback.
struct Slot<T> {
    callback: Box<dyn Fn(&T)>,
}

struct CellInner<T> {
    value: T,
    /// Monotonically increasing, bumped once per `set`.
    version: u64,
    subscribers: Vec<Weak<Slot<T>>>,
}

/// A single mutable slot holding a value of type `T`, exposed to observers.
///
/// See the [module docs](self) for invariants and failure modes.
pub struct ReactiveCell<T> {
    inner: Rc<RefCell<CellInner<T>>>,
}

impl<T> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ReactiveCell")
            .field("value", &inner.value)
            .field("version", &inner.version)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: 'static> ReactiveCell<T> {
    /// Create a cell holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(CellInner {
                value,
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Replace the value and notify all live subscribers synchronously.
    ///
    /// No equality gate: setting a value equal to the current one still
    /// counts as an update and still notifies.
    pub fn set(&self, value: T) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.value = value;
            inner.version += 1;
        }
        self.notify();
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let inner = self.inner.borrow();
        f(&inner.value)
    }

    /// Current version number. Increments by 1 on each `set`.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Register a change callback; returns an RAII guard that unsubscribes
    /// on drop.
    ///
    /// The callback receives a reference to the new value after each `set`.
    /// It does **not** fire for the value the cell already holds at
    /// subscription time.
    #[must_use]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let slot = Rc::new(Slot {
            callback: Box::new(callback),
        });
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&slot));
        Subscription { _slot: slot }
    }

    /// Snapshot live subscribers, prune dead ones, then invoke outside the
    /// mutable borrow so callbacks can read the cell.
    fn notify(&self) {
        let live: Vec<Rc<Slot<T>>> = {
            let mut inner = self.inner.borrow_mut();
            inner.subscribers.retain(|w| w.strong_count() > 0);
            inner.subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for slot in live {
            let inner = self.inner.borrow();
            (slot.callback)(&inner.value);
        }
    }
}

impl<T: Clone + 'static> ReactiveCell<T> {
    /// Get a clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }
}

/// RAII guard for a [`ReactiveCell`] subscription.
///
/// Holds the strong reference to the callback; dropping the guard removes
/// the callback before the next notification cycle.
pub struct Subscription {
    _slot: Rc<dyn Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn set_notifies_synchronously() {
        let cell = ReactiveCell::new(1);
        let seen = Rc::new(Cell::new(0));
        let seen_clone = Rc::clone(&seen);
        let _sub = cell.subscribe(move |v| seen_clone.set(*v));

        cell.set(42);
        // Observer ran before set() returned.
        assert_eq!(seen.get(), 42);
    }

    #[test]
    fn exactly_one_notification_per_set() {
        let cell = ReactiveCell::new(0);
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        let _sub = cell.subscribe(move |_| count_clone.set(count_clone.get() + 1));

        cell.set(1);
        cell.set(1); // same value still notifies
        cell.set(2);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn subscribers_notified_in_registration_order() {
        let cell = ReactiveCell::new(0);
        let order = Rc::new(RefCell::new(Vec::new()));

        let o1 = Rc::clone(&order);
        let _s1 = cell.subscribe(move |_| o1.borrow_mut().push("first"));
        let o2 = Rc::clone(&order);
        let _s2 = cell.subscribe(move |_| o2.borrow_mut().push("second"));

        cell.set(1);
        assert_eq!(*order.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn dropped_subscription_stops_notifications() {
        let cell = ReactiveCell::new(0);
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        let sub = cell.subscribe(move |_| count_clone.set(count_clone.get() + 1));

        cell.set(1);
        assert_eq!(count.get(), 1);

        drop(sub);
        cell.set(2);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn version_increments_per_set() {
        let cell = ReactiveCell::new("a".to_string());
        assert_eq!(cell.version(), 0);
        cell.set("b".to_string());
        cell.set("c".to_string());
        assert_eq!(cell.version(), 2);
    }

    #[test]
    fn clone_shares_slot() {
        let a = ReactiveCell::new(1);
        let b = a.clone();
        b.set(7);
        assert_eq!(a.get(), 7);
        assert_eq!(a.version(), b.version());
    }

    #[test]
    fn callback_may_read_the_cell() {
        let cell = ReactiveCell::new(10);
        let observed = Rc::new(Cell::new(0));
        let obs_clone = Rc::clone(&observed);
        let cell_handle = cell.clone();
        let _sub = cell.subscribe(move |_| {
            obs_clone.set(cell_handle.with(|v| *v));
        });

        cell.set(99);
        assert_eq!(observed.get(), 99);
    }

    #[test]
    fn with_borrows_without_clone() {
        let cell = ReactiveCell::new(vec![1, 2, 3]);
        let sum: i32 = cell.with(|v| v.iter().sum());
        assert_eq!(sum, 6);
    }

    #[test]
    fn dead_subscribers_are_pruned() {
        let cell = ReactiveCell::new(0);
        for _ in 0..8 {
            let sub = cell.subscribe(|_| {});
            drop(sub);
        }
        cell.set(1);
        assert_eq!(cell.inner.borrow().subscribers.len(), 0);
    }
}
