#![forbid(unsafe_code)]

//! Time sources for the scheduler.
//!
//! A [`Clock`] is either the real wall clock or a [`LabClock`] that only moves
//! when told to. Every timer in Cadence reads time through a `Clock`, so a test
//! that owns the `LabClock` controls exactly when debounce windows close,
//! reconnect delays elapse and heartbeats fire.
//!
//! # Example
//!
//! ```
//! use cadence_core::clock::{Clock, LabClock};
//! use web_time::Duration;
//!
//! let lab = LabClock::new();
//! let clock = Clock::Lab(lab.clone());
//! let before = clock.now();
//!
//! lab.advance(Duration::from_millis(250));
//! assert_eq!(clock.now() - before, Duration::from_millis(250));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use web_time::{Duration, Instant, SystemTime};

// ─── LabClock ────────────────────────────────────────────────────────────────

/// A manually-advanceable clock for deterministic tests.
///
/// All clones share the same offset, so every component holding a clone sees
/// the same time. The clock never moves backwards.
#[derive(Debug, Clone)]
pub struct LabClock {
    epoch: Instant,
    epoch_unix_ms: u64,
    offset_us: Arc<AtomicU64>,
}

impl LabClock {
    /// Create a lab clock starting at `Instant::now()` and the current
    /// wall-clock date.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at_unix_ms(system_unix_ms())
    }

    /// Create a lab clock whose [`unix_millis`](Self::unix_millis) starts at
    /// `unix_ms`. Useful when tests assert on record timestamps.
    #[must_use]
    pub fn starting_at_unix_ms(unix_ms: u64) -> Self {
        Self {
            epoch: Instant::now(),
            epoch_unix_ms: unix_ms,
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the lab clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = duration_us(delta);
        let _ = self
            .offset_us
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                Some(cur.saturating_add(us))
            });
    }

    /// Move the clock forward to `instant`. Instants in the past are ignored.
    pub fn advance_to(&self, instant: Instant) {
        let target = instant
            .checked_duration_since(self.epoch)
            .unwrap_or(Duration::ZERO);
        self.offset_us
            .fetch_max(duration_us(target), Ordering::AcqRel);
    }

    /// Current lab time.
    #[must_use]
    pub fn now(&self) -> Instant {
        saturating_add(self.epoch, self.elapsed())
    }

    /// Latest instant this clock can reach.
    pub(crate) fn horizon(&self) -> Instant {
        saturating_add(self.epoch, Duration::from_micros(u64::MAX))
    }

    /// Total time this clock has been advanced.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.offset_us.load(Ordering::Acquire))
    }

    /// Milliseconds since the UNIX epoch according to this clock.
    #[must_use]
    pub fn unix_millis(&self) -> u64 {
        self.epoch_unix_ms
            .saturating_add(self.offset_us.load(Ordering::Acquire) / 1_000)
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Clock ───────────────────────────────────────────────────────────────────

/// Time source used by schedulers and histories.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Real wall-clock time.
    #[default]
    Real,
    /// Deterministic lab clock for testing.
    Lab(LabClock),
}

impl Clock {
    /// Current monotonic time.
    #[must_use]
    pub fn now(&self) -> Instant {
        match self {
            Self::Real => Instant::now(),
            Self::Lab(lab) => lab.now(),
        }
    }

    /// Milliseconds since the UNIX epoch.
    #[must_use]
    pub fn unix_millis(&self) -> u64 {
        match self {
            Self::Real => system_unix_ms(),
            Self::Lab(lab) => lab.unix_millis(),
        }
    }

    /// Whether this clock is a lab clock.
    #[inline]
    #[must_use]
    pub fn is_lab(&self) -> bool {
        matches!(self, Self::Lab(_))
    }

    /// The underlying lab clock, if any.
    #[must_use]
    pub fn as_lab(&self) -> Option<&LabClock> {
        match self {
            Self::Real => None,
            Self::Lab(lab) => Some(lab),
        }
    }
}

/// `from + delay`, saturating to a far-future instant.
pub(crate) fn saturating_add(from: Instant, delay: Duration) -> Instant {
    let mut step = delay;
    loop {
        if let Some(instant) = from.checked_add(step) {
            return instant;
        }
        step /= 2;
    }
}

fn duration_us(d: Duration) -> u64 {
    d.as_micros().min(u64::MAX as u128) as u64
}

fn system_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}
