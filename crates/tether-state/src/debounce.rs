#![forbid(unsafe_code)]

//! Trailing-edge debounce over a reactive source value.
//!
//! # Design
//!
//! A [`DebouncedValue<T>`] subscribes to a source [`ReactiveCell`] and
//! exposes a derived cell that lags it. Each source change cancels any
//! pending timer and schedules a new one of `wait`; when a timer fires
//! uncancelled, the derived cell is set to the source value **at fire time**.
//! N rapid changes within `wait` of each other therefore coalesce into
//! exactly one derived update carrying the last value of the burst.
//!
//! A zero `wait` degenerates to synchronous propagation on every source
//! change (`Duration` is unsigned, so "zero or negative" collapses to zero).
//!
//! # Invariants
//!
//! 1. At most one timer is pending per instance; starting a new window
//!    cancels the previous timer.
//! 2. The derived value is always either the initial source value or a value
//!    the source held after the most recent full quiet period, never an
//!    intermediate mid-burst value.
//! 3. No derived update fires after the instance is dropped, even under a
//!    scheduler that ignores `cancel`: timer callbacks hold only a weak
//!    reference and re-check the window epoch before applying.

use std::cell::RefCell;
use std::rc::Rc;

use tether_core::{ReactiveCell, Scheduler, Subscription, TimerHandle};
use web_time::Duration;

struct DebounceWindow {
    pending: Option<TimerHandle>,
    /// Bumped on every (re)schedule and on drop; a firing timer applies only
    /// if its epoch is still current.
    epoch: u64,
}

/// A derived reactive value that lags a source until it goes quiet.
pub struct DebouncedValue<T> {
    derived: ReactiveCell<T>,
    window: Rc<RefCell<DebounceWindow>>,
    scheduler: Rc<dyn Scheduler>,
    _source_sub: Subscription,
}

impl<T: Clone + 'static> DebouncedValue<T> {
    /// Derive a debounced value from `source` with the given quiet period.
    #[must_use]
    pub fn new(source: &ReactiveCell<T>, wait: Duration, scheduler: Rc<dyn Scheduler>) -> Self {
        let derived = ReactiveCell::new(source.get());
        let window = Rc::new(RefCell::new(DebounceWindow {
            pending: None,
            epoch: 0,
        }));

        let source_sub = source.subscribe({
            let derived = derived.clone();
            let window = Rc::downgrade(&window);
            let scheduler = Rc::clone(&scheduler);
            let source = source.clone();
            move |value: &T| {
                if wait.is_zero() {
                    derived.set(value.clone());
                    return;
                }
                let Some(window) = window.upgrade() else {
                    return;
                };

                let epoch = {
                    let mut w = window.borrow_mut();
                    if let Some(prev) = w.pending.take() {
                        scheduler.cancel(prev);
                    }
                    w.epoch += 1;
                    w.epoch
                };

                let handle = scheduler.schedule(wait, {
                    let derived = derived.clone();
                    let source = source.clone();
                    let window = Rc::downgrade(&window);
                    Box::new(move || {
                        let Some(window) = window.upgrade() else {
                            return;
                        };
                        {
                            let mut w = window.borrow_mut();
                            if w.epoch != epoch {
                                return; // superseded or dropped
                            }
                            w.pending = None;
                        }
                        // Latest source value at fire time, not the one that
                        // started the window.
                        derived.set(source.get());
                    })
                });
                window.borrow_mut().pending = Some(handle);
            }
        });

        Self {
            derived,
            window,
            scheduler,
            _source_sub: source_sub,
        }
    }

    /// Clone of the current derived value.
    #[must_use]
    pub fn get(&self) -> T {
        self.derived.get()
    }

    /// The derived reactive cell, for composition.
    #[must_use]
    pub fn cell(&self) -> &ReactiveCell<T> {
        &self.derived
    }

    /// Observe derived-value changes. See [`ReactiveCell::subscribe`].
    #[must_use]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        self.derived.subscribe(callback)
    }
}

impl<T> Drop for DebouncedValue<T> {
    fn drop(&mut self) {
        let mut w = self.window.borrow_mut();
        w.epoch += 1;
        if let Some(pending) = w.pending.take() {
            self.scheduler.cancel(pending);
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for DebouncedValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebouncedValue")
            .field("derived", &self.derived)
            .field("pending", &self.window.borrow().pending.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
