#![forbid(unsafe_code)]

//! Rate-limited projections and watchers over an [`Observable`].
//!
//! A projection owns an output observable that follows its source through a
//! gate: [`Debounced`] publishes the final value of each burst, [`Throttled`]
//! publishes the first value immediately and the last one at the end of the
//! cooldown.
//!
//! [`watch_debounced`] and [`watch_throttled`] run a callback through the same
//! gates without an output observable.

use std::fmt;
use std::rc::Rc;

use cadence_core::{Observable, Scheduler, Subscription};
use web_time::Duration;

use super::gate::{Debouncer, Gate, Throttler};

/// Debounced view of a source observable.
pub struct Debounced<T: 'static> {
    output: Observable<T>,
    gate: Rc<Debouncer<T>>,
    _source: Subscription,
}

/// Throttled view of a source observable.
pub struct Throttled<T: 'static> {
    output: Observable<T>,
    gate: Rc<Throttler<T>>,
    _source: Subscription,
}

/// Create a projection that takes `source`'s value once it has been stable for
/// `window`.
///
/// The projection starts at the source's current value.
pub fn debounced<T>(source: &Observable<T>, window: Duration, scheduler: &Scheduler) -> Debounced<T>
where
    T: Clone + PartialEq + 'static,
{
    let output = Observable::new(source.get());
    let sink_out = output.clone();
    let gate = Rc::new(Debouncer::new(scheduler, window, move |v: T| {
        sink_out.set(v);
    }));
    let weak = Rc::downgrade(&gate);
    let sub = source.subscribe(move |v| {
        if let Some(gate) = weak.upgrade() {
            gate.call(v.clone());
        }
    });
    Debounced {
        output,
        gate,
        _source: sub,
    }
}

/// Create a projection that follows `source` at most once per `window`, plus
/// one trailing catch-up.
///
/// The projection starts at the source's current value.
pub fn throttled<T>(source: &Observable<T>, window: Duration, scheduler: &Scheduler) -> Throttled<T>
where
    T: Clone + PartialEq + 'static,
{
    let output = Observable::new(source.get());
    let sink_out = output.clone();
    let gate = Rc::new(Throttler::new(scheduler, window, move |v: T| {
        sink_out.set(v);
    }));
    let weak = Rc::downgrade(&gate);
    let sub = source.subscribe(move |v| {
        if let Some(gate) = weak.upgrade() {
            gate.call(v.clone());
        }
    });
    Throttled {
        output,
        gate,
        _source: sub,
    }
}

macro_rules! projection_accessors {
    ($ty:ident) => {
        impl<T: Clone + 'static> $ty<T> {
            /// The projected observable.
            #[must_use]
            pub fn observable(&self) -> &Observable<T> {
                &self.output
            }

            /// Current projected value.
            #[must_use]
            pub fn get(&self) -> T {
                self.output.get()
            }

            /// Drop any update still waiting on the gate.
            pub fn cancel(&self) {
                self.gate.cancel();
            }

            /// Whether an update is waiting on the gate.
            #[must_use]
            pub fn is_pending(&self) -> bool {
                self.gate.is_pending()
            }
        }

        impl<T: fmt::Debug + 'static> fmt::Debug for $ty<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("output", &self.output)
                    .field("gate", &self.gate)
                    .finish()
            }
        }
    };
}

projection_accessors!(Debounced);
projection_accessors!(Throttled);

// ─── Watchers ────────────────────────────────────────────────────────────────

/// Guard for a rate-limited watcher. Dropping it detaches the watcher and
/// discards any pending call.
pub struct RateLimitedWatch {
    _subscription: Subscription,
    gate: Rc<dyn Gate>,
}

impl RateLimitedWatch {
    /// Discard the pending call without detaching.
    pub fn cancel(&self) {
        self.gate.cancel();
    }

    /// Whether a call is waiting on the gate.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.gate.is_pending()
    }
}

impl fmt::Debug for RateLimitedWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedWatch")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Call `f` with the latest value once `source` has been stable for `window`.
pub fn watch_debounced<T>(
    source: &Observable<T>,
    window: Duration,
    scheduler: &Scheduler,
    f: impl FnMut(T) + 'static,
) -> RateLimitedWatch
where
    T: Clone + 'static,
{
    let gate = Rc::new(Debouncer::new(scheduler, window, f));
    attach(source, gate)
}

/// Call `f` with `source`'s values at most once per `window`, plus one
/// trailing call.
pub fn watch_throttled<T>(
    source: &Observable<T>,
    window: Duration,
    scheduler: &Scheduler,
    f: impl FnMut(T) + 'static,
) -> RateLimitedWatch
where
    T: Clone + 'static,
{
    let gate = Rc::new(Throttler::new(scheduler, window, f));
    attach(source, gate)
}

trait CallGate<T>: Gate {
    fn call_with(&self, value: T);
}

impl<T: 'static> CallGate<T> for Debouncer<T> {
    fn call_with(&self, value: T) {
        self.call(value);
    }
}

impl<T: 'static> CallGate<T> for Throttler<T> {
    fn call_with(&self, value: T) {
        self.call(value);
    }
}

fn attach<T, G>(source: &Observable<T>, gate: Rc<G>) -> RateLimitedWatch
where
    T: Clone + 'static,
    G: CallGate<T> + 'static,
{
    let weak = Rc::downgrade(&gate);
    let sub = source.subscribe(move |v| {
        if let Some(gate) = weak.upgrade() {
            gate.call_with(v.clone());
        }
    });
    RateLimitedWatch {
        _subscription: sub,
        gate,
    }
}
