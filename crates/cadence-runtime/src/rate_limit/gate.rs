#![forbid(unsafe_code)]

//! Rate-limited function gates.
//!
//! A gate sits in front of a sink `FnMut(A)` and decides *when* calls reach
//! it. Both gates keep only the latest argument while waiting.
//!
//! - [`Debouncer`]: trailing edge only. Each call restarts the window; the
//!   sink runs once the window elapses with no further calls.
//! - [`Throttler`]: leading edge plus one trailing catch-up per window.
//!
//! # Invariants
//!
//! 1. A gate owns exactly one [`TimerSlot`]; re-arming clears the old timer.
//! 2. Timer callbacks hold only a `Weak` reference. Dropping the gate clears
//!    its timer and no pending call ever reaches the sink.
//! 3. State transitions complete before the sink runs, so a sink may call back
//!    into its own gate.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use cadence_core::{Scheduler, TimerSlot};
use web_time::Duration;

use super::DEFAULT_WINDOW;

type Sink<A> = RefCell<Box<dyn FnMut(A)>>;

// ─── Debouncer ───────────────────────────────────────────────────────────────

struct DebounceInner<A> {
    window: Duration,
    slot: RefCell<TimerSlot>,
    pending: RefCell<Option<A>>,
    sink: Sink<A>,
}

/// Trailing-edge debounce gate.
///
/// # Example
///
/// ```
/// use cadence_core::Scheduler;
/// use cadence_runtime::rate_limit::Debouncer;
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use web_time::Duration;
///
/// let (sched, _lab) = Scheduler::lab();
/// let out = Rc::new(RefCell::new(Vec::new()));
/// let o = Rc::clone(&out);
/// let gate = Debouncer::new(&sched, Duration::from_millis(50), move |v: i32| {
///     o.borrow_mut().push(v)
/// });
///
/// gate.call(1);
/// gate.call(2);
/// sched.advance(Duration::from_millis(50));
/// assert_eq!(*out.borrow(), vec![2]);
/// ```
pub struct Debouncer<A> {
    inner: Rc<DebounceInner<A>>,
}

impl<A> fmt::Debug for Debouncer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.inner.window)
            .field("pending", &self.inner.pending.borrow().is_some())
            .finish()
    }
}

impl<A: 'static> Debouncer<A> {
    /// Create a gate that forwards to `sink` once `window` passes quietly.
    pub fn new(scheduler: &Scheduler, window: Duration, sink: impl FnMut(A) + 'static) -> Self {
        Self {
            inner: Rc::new(DebounceInner {
                window,
                slot: RefCell::new(TimerSlot::new(scheduler)),
                pending: RefCell::new(None),
                sink: RefCell::new(Box::new(sink)),
            }),
        }
    }

    /// Gate with the [`DEFAULT_WINDOW`].
    pub fn with_default_window(scheduler: &Scheduler, sink: impl FnMut(A) + 'static) -> Self {
        Self::new(scheduler, DEFAULT_WINDOW, sink)
    }

    /// Record `arg` and restart the window.
    pub fn call(&self, arg: A) {
        *self.inner.pending.borrow_mut() = Some(arg);
        let weak = Rc::downgrade(&self.inner);
        self.inner
            .slot
            .borrow_mut()
            .arm_timeout(self.inner.window, move || Self::flush(&weak));
    }

    /// Drop the pending call, if any.
    pub fn cancel(&self) {
        self.inner.slot.borrow_mut().clear();
        self.inner.pending.borrow_mut().take();
    }

    /// Whether a call is waiting for the window to elapse.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }

    /// The debounce window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    fn flush(weak: &Weak<DebounceInner<A>>) {
        let Some(inner) = weak.upgrade() else { return };
        let Some(arg) = inner.pending.borrow_mut().take() else {
            return;
        };
        tracing::trace!(window_ms = inner.window.as_millis() as u64, "debounce flush");
        (inner.sink.borrow_mut())(arg);
    }
}

// ─── Throttler ───────────────────────────────────────────────────────────────

enum ThrottleState<A> {
    Idle,
    Cooling { pending: Option<A> },
}

struct ThrottleInner<A> {
    window: Duration,
    slot: RefCell<TimerSlot>,
    state: RefCell<ThrottleState<A>>,
    sink: Sink<A>,
}

/// Leading-edge throttle gate with a single trailing catch-up.
///
/// The first call while idle reaches the sink immediately and starts a
/// cooldown. Calls during the cooldown are held (latest wins); when the
/// cooldown ends, a held call reaches the sink and starts a new cooldown.
/// A cooldown that ends with nothing held returns the gate to idle.
pub struct Throttler<A> {
    inner: Rc<ThrottleInner<A>>,
}

impl<A> fmt::Debug for Throttler<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.state.borrow() {
            ThrottleState::Idle => "idle",
            ThrottleState::Cooling { pending: None } => "cooling",
            ThrottleState::Cooling { pending: Some(_) } => "cooling+pending",
        };
        f.debug_struct("Throttler")
            .field("window", &self.inner.window)
            .field("state", &state)
            .finish()
    }
}

impl<A: 'static> Throttler<A> {
    /// Create a gate that forwards to `sink` at most once per `window`, plus
    /// one trailing call.
    pub fn new(scheduler: &Scheduler, window: Duration, sink: impl FnMut(A) + 'static) -> Self {
        Self {
            inner: Rc::new(ThrottleInner {
                window,
                slot: RefCell::new(TimerSlot::new(scheduler)),
                state: RefCell::new(ThrottleState::Idle),
                sink: RefCell::new(Box::new(sink)),
            }),
        }
    }

    /// Gate with the [`DEFAULT_WINDOW`].
    pub fn with_default_window(scheduler: &Scheduler, sink: impl FnMut(A) + 'static) -> Self {
        Self::new(scheduler, DEFAULT_WINDOW, sink)
    }

    /// Forward `arg` now if idle, otherwise hold it for the trailing edge.
    pub fn call(&self, arg: A) {
        {
            let mut state = self.inner.state.borrow_mut();
            if let ThrottleState::Cooling { pending } = &mut *state {
                *pending = Some(arg);
                return;
            }
            *state = ThrottleState::Cooling { pending: None };
        }
        Self::start_cooldown(&self.inner);
        tracing::trace!(window_ms = self.inner.window.as_millis() as u64, "throttle leading edge");
        (self.inner.sink.borrow_mut())(arg);
    }

    /// Drop any held call and return to idle.
    pub fn cancel(&self) {
        self.inner.slot.borrow_mut().clear();
        *self.inner.state.borrow_mut() = ThrottleState::Idle;
    }

    /// Whether a call is held for the trailing edge.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(
            &*self.inner.state.borrow(),
            ThrottleState::Cooling { pending: Some(_) }
        )
    }

    /// Whether the gate is inside a cooldown window.
    #[must_use]
    pub fn is_cooling(&self) -> bool {
        matches!(&*self.inner.state.borrow(), ThrottleState::Cooling { .. })
    }

    /// The throttle window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.inner.window
    }

    fn start_cooldown(inner: &Rc<ThrottleInner<A>>) {
        let weak = Rc::downgrade(inner);
        inner
            .slot
            .borrow_mut()
            .arm_timeout(inner.window, move || Self::cooldown_elapsed(&weak));
    }

    fn cooldown_elapsed(weak: &Weak<ThrottleInner<A>>) {
        let Some(inner) = weak.upgrade() else { return };
        let held = {
            let mut state = inner.state.borrow_mut();
            match std::mem::replace(&mut *state, ThrottleState::Idle) {
                ThrottleState::Cooling { pending: Some(arg) } => {
                    *state = ThrottleState::Cooling { pending: None };
                    Some(arg)
                }
                _ => None,
            }
        };
        let Some(arg) = held else { return };
        Self::start_cooldown(&inner);
        tracing::trace!(window_ms = inner.window.as_millis() as u64, "throttle trailing edge");
        (inner.sink.borrow_mut())(arg);
    }
}

// ─── Type-erased handle ──────────────────────────────────────────────────────

/// Object-safe view of a gate, used by guards that own one.
pub(crate) trait Gate {
    fn cancel(&self);
    fn is_pending(&self) -> bool;
}

impl<A: 'static> Gate for Debouncer<A> {
    fn cancel(&self) {
        Debouncer::cancel(self);
    }

    fn is_pending(&self) -> bool {
        Debouncer::is_pending(self)
    }
}

impl<A: 'static> Gate for Throttler<A> {
    fn cancel(&self) {
        Throttler::cancel(self);
    }

    fn is_pending(&self) -> bool {
        Throttler::is_pending(self)
    }
}
