#![forbid(unsafe_code)]

//! Timer scheduler contract and a deterministic manual implementation.
//!
//! # Design
//!
//! The host owns timer scheduling; components only see the [`Scheduler`]
//! trait. [`ManualScheduler`] is the in-crate implementation: a binary-heap
//! timer queue over a manually-advanceable clock, so tests control time
//! explicitly instead of sleeping.
//!
//! # Invariants
//!
//! 1. [`advance()`](ManualScheduler::advance) fires every due timer, in
//!    deadline order, FIFO on equal deadlines.
//! 2. A cancelled timer never fires.
//! 3. A callback scheduled during `advance()` with a deadline inside the
//!    advanced window fires within the same `advance()` call.
//! 4. The clock ends exactly `delta` past where it started, regardless of
//!    how many timers fired.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::HashSet;

use web_time::{Duration, Instant};

/// Opaque handle identifying one scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

/// Host-provided timer scheduling contract.
///
/// Single-threaded: callbacks run on the caller's turn, never concurrently.
pub trait Scheduler {
    /// Schedule `callback` to run once after `delay`.
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle;

    /// Cancel a pending timer. Cancelling an already-fired or unknown handle
    /// is a no-op.
    fn cancel(&self, handle: TimerHandle);
}

struct PendingTimer {
    deadline: Instant,
    /// FIFO tie-break for equal deadlines.
    seq: u64,
    id: u64,
    callback: Box<dyn FnOnce()>,
}

impl PartialEq for PendingTimer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for PendingTimer {}

impl PartialOrd for PendingTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingTimer {
    // Reversed so the BinaryHeap pops the earliest deadline first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct SchedInner {
    now: Instant,
    next_id: u64,
    next_seq: u64,
    queue: BinaryHeap<PendingTimer>,
    cancelled: HashSet<u64>,
}

/// Deterministic, manually-advanceable timer scheduler.
///
/// Timers fire only when [`advance()`](ManualScheduler::advance) moves the
/// clock past their deadline. Wrap in `Rc` to share with components taking
/// `Rc<dyn Scheduler>`.
pub struct ManualScheduler {
    inner: RefCell<SchedInner>,
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(SchedInner {
                now: Instant::now(),
                next_id: 1,
                next_seq: 0,
                queue: BinaryHeap::new(),
                cancelled: HashSet::new(),
            }),
        }
    }

    /// Current scheduler time.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.inner.borrow().now
    }

    /// Number of timers still pending (cancelled-but-unreaped ones excluded).
    #[must_use]
    pub fn pending(&self) -> usize {
        let inner = self.inner.borrow();
        inner
            .queue
            .iter()
            .filter(|t| !inner.cancelled.contains(&t.id))
            .count()
    }

    /// Advance the clock by `delta`, firing every due timer in deadline
    /// order (FIFO on ties).
    ///
    /// The clock is moved to each timer's deadline before its callback runs,
    /// so callbacks scheduling relative timers observe consistent time.
    pub fn advance(&self, delta: Duration) {
        let target = self.inner.borrow().now + delta;
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                let due = inner.queue.peek().is_some_and(|t| t.deadline <= target);
                if due { inner.queue.pop() } else { None }
            };
            let Some(timer) = next else { break };
            {
                let mut inner = self.inner.borrow_mut();
                if inner.cancelled.remove(&timer.id) {
                    continue;
                }
                if timer.deadline > inner.now {
                    inner.now = timer.deadline;
                }
            }
            // Borrow released: the callback may schedule or cancel timers.
            (timer.callback)();
        }
        let mut inner = self.inner.borrow_mut();
        if target > inner.now {
            inner.now = target;
        }
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let deadline = inner.now + delay;
        inner.queue.push(PendingTimer {
            deadline,
            seq,
            id,
            callback,
        });
        tracing::trace!(timer = id, delay_ms = delay.as_millis() as u64, "timer.scheduled");
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        let mut inner = self.inner.borrow_mut();
        inner.cancelled.insert(handle.0);
        tracing::trace!(timer = handle.0, "timer.cancelled");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn record(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Box<dyn FnOnce()> {
        let log = Rc::clone(log);
        Box::new(move || log.borrow_mut().push(tag))
    }

    #[test]
    fn fires_in_deadline_order() {
        let sched = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let _b = sched.schedule(Duration::from_millis(50), record(&log, "b"));
        let _a = sched.schedule(Duration::from_millis(10), record(&log, "a"));
        let _c = sched.schedule(Duration::from_millis(90), record(&log, "c"));

        sched.advance(Duration::from_millis(100));
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn equal_deadlines_fire_fifo() {
        let sched = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let _a = sched.schedule(Duration::from_millis(10), record(&log, "first"));
        let _b = sched.schedule(Duration::from_millis(10), record(&log, "second"));

        sched.advance(Duration::from_millis(10));
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let sched = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let keep = sched.schedule(Duration::from_millis(10), record(&log, "keep"));
        let drop_me = sched.schedule(Duration::from_millis(10), record(&log, "dropped"));
        sched.cancel(drop_me);

        sched.advance(Duration::from_millis(20));
        assert_eq!(*log.borrow(), vec!["keep"]);
        let _ = keep;
    }

    #[test]
    fn undue_timers_stay_pending() {
        let sched = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let _t = sched.schedule(Duration::from_millis(100), record(&log, "late"));
        sched.advance(Duration::from_millis(99));
        assert!(log.borrow().is_empty());
        assert_eq!(sched.pending(), 1);

        sched.advance(Duration::from_millis(1));
        assert_eq!(*log.borrow(), vec!["late"]);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn callback_scheduled_inside_window_fires_same_advance() {
        let sched = Rc::new(ManualScheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let sched_clone = Rc::clone(&sched);
        let log_clone = Rc::clone(&log);
        let _t = sched.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                log_clone.borrow_mut().push("outer");
                let inner_log = Rc::clone(&log_clone);
                let _ = sched_clone.schedule(
                    Duration::from_millis(5),
                    Box::new(move || inner_log.borrow_mut().push("inner")),
                );
            }),
        );

        // Window covers both the outer timer (t=10) and the nested one (t=15).
        sched.advance(Duration::from_millis(20));
        assert_eq!(*log.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn clock_advances_exactly_by_delta() {
        let sched = ManualScheduler::new();
        let start = sched.now();
        let _t = sched.schedule(Duration::from_millis(3), Box::new(|| {}));
        sched.advance(Duration::from_millis(10));
        assert_eq!(sched.now() - start, Duration::from_millis(10));
    }
}
