#![forbid(unsafe_code)]

//! Single-threaded timer scheduler.
//!
//! [`Scheduler`] is the event loop's timer wheel: components register
//! one-shot timeouts and repeating intervals, and the owner of the loop fires
//! whatever is due, either against the real clock with
//! [`run_due`](Scheduler::run_due) or deterministically with
//! [`advance`](Scheduler::advance) on a lab clock.
//!
//! [`TimerSlot`] wraps the "one current timer handle" pattern every
//! rate-limited component needs: arming a slot always clears whatever the slot
//! held before.
//!
//! # Invariants
//!
//! 1. Due timers fire in deadline order; equal deadlines fire in the order they
//!    were scheduled.
//! 2. During [`advance`](Scheduler::advance) the lab clock reads exactly the
//!    timer's deadline while its callback runs.
//! 3. No scheduler borrow is held while a callback runs. Callbacks may schedule
//!    or clear timers, including the interval that is currently firing.
//! 4. A cleared timer never fires.
//! 5. A [`TimerSlot`] owns at most one outstanding timer, and clears it on drop.
//!
//! # Failure Modes
//!
//! - **Nested drive**: calling `run_due`/`advance` from inside a timer
//!   callback returns 0 without firing anything.
//! - **Overflowing delay**: a delay such as `Duration::MAX` saturates to a
//!   deadline that never comes due.
//! - **Zero-length interval**: periods are clamped to [`MIN_INTERVAL`] so an
//!   interval cannot starve the loop.

use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::rc::Rc;

use web_time::{Duration, Instant};

use crate::clock::{Clock, LabClock, saturating_add};
use crate::logging::{debug, trace};

/// Shortest period accepted by [`Scheduler::set_interval`].
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Opaque handle of a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Raw numeric id (for logging).
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

enum Callback {
    Once(Box<dyn FnOnce()>),
    Every {
        period: Duration,
        f: Box<dyn FnMut()>,
    },
}

struct Entry {
    deadline: Instant,
    seq: u64,
    callback: Callback,
}

struct SchedulerInner {
    clock: Clock,
    next_id: u64,
    next_seq: u64,
    queue: BinaryHeap<Reverse<(Instant, u64, TimerId)>>,
    entries: HashMap<TimerId, Entry>,
    /// Interval currently running its callback, and whether it was cleared
    /// from inside that callback.
    firing: Option<(TimerId, bool)>,
    /// Set while `run_due` or `advance` is draining the queue.
    driving: bool,
    fired_total: u64,
}

impl SchedulerInner {
    fn insert(&mut self, id: TimerId, deadline: Instant, callback: Callback) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse((deadline, seq, id)));
        self.entries.insert(
            id,
            Entry {
                deadline,
                seq,
                callback,
            },
        );
    }

    /// Pop the earliest live entry due at or before `now`.
    fn pop_due(&mut self, now: Instant) -> Option<(TimerId, Entry)> {
        while let Some(Reverse((deadline, seq, id))) = self.queue.peek().copied() {
            if deadline > now {
                return None;
            }
            self.queue.pop();
            let live = self.entries.get(&id).is_some_and(|e| e.seq == seq);
            if !live {
                continue;
            }
            if let Some(entry) = self.entries.remove(&id) {
                return Some((id, entry));
            }
        }
        None
    }
}

/// Cloneable handle to a single-threaded timer queue.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Scheduler")
            .field("clock", &inner.clock)
            .field("pending", &inner.entries.len())
            .field("fired_total", &inner.fired_total)
            .finish()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Clock::Real)
    }
}

impl Scheduler {
    /// Create a scheduler reading time from `clock`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SchedulerInner {
                clock,
                next_id: 1,
                next_seq: 0,
                queue: BinaryHeap::new(),
                entries: HashMap::new(),
                firing: None,
                driving: false,
                fired_total: 0,
            })),
        }
    }

    /// Scheduler on the real clock.
    #[must_use]
    pub fn real() -> Self {
        Self::new(Clock::Real)
    }

    /// Scheduler on a fresh lab clock, plus the clock to drive it.
    #[must_use]
    pub fn lab() -> (Self, LabClock) {
        let lab = LabClock::new();
        (Self::new(Clock::Lab(lab.clone())), lab)
    }

    /// The clock this scheduler reads.
    #[must_use]
    pub fn clock(&self) -> Clock {
        self.inner.borrow().clock.clone()
    }

    /// Current time on the scheduler's clock.
    #[must_use]
    pub fn now(&self) -> Instant {
        self.inner.borrow().clock.now()
    }

    /// Run `f` once, `delay` from now.
    pub fn set_timeout(&self, delay: Duration, f: impl FnOnce() + 'static) -> TimerId {
        let mut inner = self.inner.borrow_mut();
        let id = TimerId(inner.next_id);
        inner.next_id += 1;
        let deadline = saturating_add(inner.clock.now(), delay);
        inner.insert(id, deadline, Callback::Once(Box::new(f)));
        trace!(timer = id.0, delay_ms = delay.as_millis() as u64, "timeout scheduled");
        id
    }

    /// Run `f` every `period` (at least [`MIN_INTERVAL`]) until cleared.
    pub fn set_interval(&self, period: Duration, f: impl FnMut() + 'static) -> TimerId {
        let period = period.max(MIN_INTERVAL);
        let mut inner = self.inner.borrow_mut();
        let id = TimerId(inner.next_id);
        inner.next_id += 1;
        let deadline = saturating_add(inner.clock.now(), period);
        inner.insert(
            id,
            deadline,
            Callback::Every {
                period,
                f: Box::new(f),
            },
        );
        trace!(timer = id.0, period_ms = period.as_millis() as u64, "interval scheduled");
        id
    }

    /// Cancel a timer. Returns `true` if it was still pending.
    pub fn clear(&self, id: TimerId) -> bool {
        let removed = {
            let mut inner = self.inner.borrow_mut();
            match inner.entries.remove(&id) {
                Some(entry) => Some(entry),
                None => {
                    if let Some((firing, cleared)) = inner.firing.as_mut()
                        && *firing == id
                        && !*cleared
                    {
                        *cleared = true;
                        trace!(timer = id.0, "interval cleared while firing");
                        return true;
                    }
                    None
                }
            }
        };
        // The callback is dropped outside the borrow; it may own handles
        // whose Drop talks to this scheduler.
        let was_pending = removed.is_some();
        drop(removed);
        if was_pending {
            trace!(timer = id.0, "timer cleared");
        }
        was_pending
    }

    /// Whether `id` will still fire.
    #[must_use]
    pub fn is_pending(&self, id: TimerId) -> bool {
        let inner = self.inner.borrow();
        inner.entries.contains_key(&id)
            || inner.firing.is_some_and(|(firing, cleared)| firing == id && !cleared)
    }

    /// Number of outstanding timers.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    /// Total number of callbacks fired since creation.
    #[must_use]
    pub fn fired_total(&self) -> u64 {
        self.inner.borrow().fired_total
    }

    /// Deadline of the earliest outstanding timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.borrow().entries.values().map(|e| e.deadline).min()
    }

    /// Time until the earliest outstanding timer, saturating at zero.
    ///
    /// Event loops use this as their poll timeout.
    #[must_use]
    pub fn time_until_next(&self) -> Option<Duration> {
        let now = self.now();
        self.next_deadline()
            .map(|deadline| deadline.checked_duration_since(now).unwrap_or(Duration::ZERO))
    }

    /// Fire every timer due at the clock's current time.
    ///
    /// Returns the number of callbacks run.
    pub fn run_due(&self) -> usize {
        if !self.begin_drive() {
            return 0;
        }
        let mut fired = 0;
        loop {
            let now = self.now();
            let next = self.inner.borrow_mut().pop_due(now);
            let Some((id, entry)) = next else { break };
            self.fire(id, entry);
            fired += 1;
        }
        self.inner.borrow_mut().driving = false;
        fired
    }

    /// Advance a lab clock by `delta`, firing timers in deadline order.
    ///
    /// On a real clock this only fires what is already due.
    pub fn advance(&self, delta: Duration) -> usize {
        let Some(lab) = self.clock().as_lab().cloned() else {
            return self.run_due();
        };
        if !self.begin_drive() {
            return 0;
        }
        let target = saturating_add(lab.now(), delta).min(lab.horizon());
        let mut fired = 0;
        loop {
            let next = self.inner.borrow_mut().pop_due(target);
            let Some((id, entry)) = next else { break };
            lab.advance_to(entry.deadline);
            self.fire(id, entry);
            fired += 1;
        }
        lab.advance_to(target);
        self.inner.borrow_mut().driving = false;
        if fired > 0 {
            debug!(fired, advanced_ms = delta.as_millis() as u64, "lab advance");
        }
        fired
    }

    /// Mark the queue as being drained. `false` if a drive is already running.
    fn begin_drive(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.driving {
            trace!("nested drive ignored");
            return false;
        }
        inner.driving = true;
        true
    }

    fn fire(&self, id: TimerId, entry: Entry) {
        self.inner.borrow_mut().fired_total += 1;
        match entry.callback {
            Callback::Once(f) => {
                trace!(timer = id.0, "timeout fired");
                f();
            }
            Callback::Every { period, mut f } => {
                self.inner.borrow_mut().firing = Some((id, false));
                trace!(timer = id.0, "interval fired");
                f();
                let mut inner = self.inner.borrow_mut();
                let cleared = inner.firing.take().is_some_and(|(_, cleared)| cleared);
                if !cleared {
                    inner.insert(
                        id,
                        saturating_add(entry.deadline, period),
                        Callback::Every { period, f },
                    );
                    return;
                }
                drop(inner);
                drop(f);
            }
        }
    }
}

// ─── TimerSlot ───────────────────────────────────────────────────────────────

/// A single "current timer" slot.
///
/// Arming always clears the previous handle first, so the slot can never have
/// two timers outstanding. Dropping the slot clears its timer.
pub struct TimerSlot {
    scheduler: Scheduler,
    current: Option<TimerId>,
}

impl fmt::Debug for TimerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerSlot")
            .field("current", &self.current)
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl TimerSlot {
    /// Create an empty slot on `scheduler`.
    #[must_use]
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            scheduler: scheduler.clone(),
            current: None,
        }
    }

    /// Clear any current timer, then arm a one-shot timeout.
    pub fn arm_timeout(&mut self, delay: Duration, f: impl FnOnce() + 'static) -> TimerId {
        self.clear();
        let id = self.scheduler.set_timeout(delay, f);
        self.current = Some(id);
        id
    }

    /// Clear any current timer, then arm a repeating interval.
    pub fn arm_interval(&mut self, period: Duration, f: impl FnMut() + 'static) -> TimerId {
        self.clear();
        let id = self.scheduler.set_interval(period, f);
        self.current = Some(id);
        id
    }

    /// Clear the current timer. Returns `true` if one was still pending.
    pub fn clear(&mut self) -> bool {
        match self.current.take() {
            Some(id) => self.scheduler.clear(id),
            None => false,
        }
    }

    /// Whether the slot holds a timer that will still fire.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.current.is_some_and(|id| self.scheduler.is_pending(id))
    }

    /// Handle of the most recently armed timer.
    #[must_use]
    pub fn id(&self) -> Option<TimerId> {
        self.current
    }

    /// The scheduler this slot arms timers on.
    #[must_use]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.clear();
    }
}
