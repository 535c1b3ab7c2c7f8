#![forbid(unsafe_code)]

//! History records and history configuration.

use std::fmt;
use std::num::NonZeroUsize;
use std::rc::Rc;

use cadence_core::Clock;

/// One committed snapshot of a history's source.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistoryRecord<T> {
    /// Value of the source at commit time, as produced by the snapshot
    /// function.
    pub snapshot: T,
    /// Commit time in milliseconds since the UNIX epoch.
    pub timestamp: u64,
}

impl<T> HistoryRecord<T> {
    /// Create a record.
    #[must_use]
    pub const fn new(snapshot: T, timestamp: u64) -> Self {
        Self {
            snapshot,
            timestamp,
        }
    }
}

pub(crate) type SnapshotFn<T> = Rc<dyn Fn(&T) -> T>;

/// Configuration for a [`CommitHistory`](super::CommitHistory).
///
/// ```
/// use cadence_runtime::undo::HistoryOptions;
/// use std::num::NonZeroUsize;
///
/// let opts = HistoryOptions::<Vec<u8>>::default()
///     .with_capacity(NonZeroUsize::new(10).unwrap());
/// assert_eq!(opts.capacity.map(NonZeroUsize::get), Some(10));
/// ```
pub struct HistoryOptions<T> {
    /// Maximum number of undo records kept; `None` keeps everything.
    pub capacity: Option<NonZeroUsize>,
    /// Clock used for record timestamps. Gated histories fall back to their
    /// scheduler's clock, manual ones to the real clock.
    pub clock: Option<Clock>,
    pub(crate) snapshot: Option<SnapshotFn<T>>,
}

impl<T> Default for HistoryOptions<T> {
    fn default() -> Self {
        Self {
            capacity: None,
            clock: None,
            snapshot: None,
        }
    }
}

impl<T> Clone for HistoryOptions<T> {
    fn clone(&self) -> Self {
        Self {
            capacity: self.capacity,
            clock: self.clock.clone(),
            snapshot: self.snapshot.clone(),
        }
    }
}

impl<T> fmt::Debug for HistoryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryOptions")
            .field("capacity", &self.capacity)
            .field("clock", &self.clock)
            .field("custom_snapshot", &self.snapshot.is_some())
            .finish()
    }
}

impl<T> HistoryOptions<T> {
    /// Bound the undo stack to `capacity` records.
    #[must_use]
    pub fn with_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Read record timestamps from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Produce snapshots with `f` instead of `Clone::clone`.
    ///
    /// Use this when `T` shares interior state (for example `Rc<RefCell<_>>`)
    /// and records must not follow later in-place mutation.
    #[must_use]
    pub fn with_snapshot(mut self, f: impl Fn(&T) -> T + 'static) -> Self {
        self.snapshot = Some(Rc::new(f));
        self
    }
}
