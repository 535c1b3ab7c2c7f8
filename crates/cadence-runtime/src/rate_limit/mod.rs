#![forbid(unsafe_code)]

//! Debounce and throttle over observables and plain callbacks.
//!
//! | Item | Emits |
//! |------|-------|
//! | [`Debouncer`], [`debounced`], [`watch_debounced`] | the last value of a burst, `window` after it ends |
//! | [`Throttler`], [`throttled`], [`watch_throttled`] | the first value immediately, then the latest value at each cooldown end |
//!
//! # Invariants
//!
//! 1. Each gate, projection or watch owns exactly one timer slot; a new change
//!    cancels the previous timer before arming its own.
//! 2. A debounced burst of N changes produces exactly one emission.
//! 3. Throttled emissions are at least `window` apart, and the last emission
//!    carries the last source value.
//! 4. Dropping any of these handles detaches it from its source and clears its
//!    timer.

mod gate;
mod projection;

use web_time::Duration;

pub(crate) use gate::Gate;
pub use gate::{Debouncer, Throttler};
pub use projection::{
    Debounced, RateLimitedWatch, Throttled, debounced, throttled, watch_debounced,
    watch_throttled,
};

/// Window used by [`Debouncer::with_default_window`] and
/// [`Throttler::with_default_window`].
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(200);
