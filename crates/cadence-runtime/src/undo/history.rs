#![forbid(unsafe_code)]

//! Commit-based undo/redo history over an [`Observable`].
//!
//! # Invariants
//!
//! 1. The undo stack is never empty: it starts with a record of the source's
//!    value at construction and [`clear`](CommitHistory::clear) leaves one
//!    record behind.
//! 2. Every commit clears the redo stack.
//! 3. With a capacity, the undo stack keeps the newest `capacity` records.
//! 4. `can_undo == (undo.len() > 1)` and `can_redo == !redo.is_empty()` after
//!    every operation.
//! 5. Writes the history makes to its own source never trigger a commit.
//!
//! # Failure Modes
//!
//! - **Shared interior state**: with the default `Clone` snapshot, a value
//!   like `Rc<RefCell<_>>` is shared between the source and its records, so
//!   in-place mutation leaks into history. Configure
//!   [`HistoryOptions::with_snapshot`] with a deep copy for such types.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::num::NonZeroUsize;
use std::rc::{Rc, Weak};

use cadence_core::{Clock, Observable, Scheduler, Subscription};
use web_time::Duration;

use super::record::{HistoryOptions, HistoryRecord, SnapshotFn};
use crate::rate_limit::{Debouncer, Gate, Throttler};

/// How a history decides when to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitTrigger {
    /// Only explicit [`commit`](CommitHistory::commit) calls.
    Manual,
    /// Every source change.
    EveryChange,
    /// Source changes through a debounce gate.
    Debounced(Duration),
    /// Source changes through a throttle gate.
    Throttled(Duration),
}

struct Stacks<T> {
    undo: Vec<HistoryRecord<T>>,
    redo: Vec<HistoryRecord<T>>,
}

struct HistoryInner<T> {
    source: Observable<T>,
    stacks: RefCell<Stacks<T>>,
    capacity: Option<NonZeroUsize>,
    snapshot: SnapshotFn<T>,
    clock: Clock,
    watched: bool,
    ignore_next: Cell<bool>,
    can_undo: Observable<bool>,
    can_redo: Observable<bool>,
}

impl<T: Clone + 'static> HistoryInner<T> {
    fn record(&self) -> HistoryRecord<T> {
        let snapshot = self.source.with(|v| (self.snapshot)(v));
        HistoryRecord::new(snapshot, self.clock.unix_millis())
    }

    fn commit(&self) {
        let record = self.record();
        let len = {
            let mut stacks = self.stacks.borrow_mut();
            stacks.undo.push(record);
            if let Some(cap) = self.capacity {
                let excess = stacks.undo.len().saturating_sub(cap.get());
                stacks.undo.drain(..excess);
            }
            stacks.redo.clear();
            stacks.undo.len()
        };
        tracing::trace!(len, "history commit");
        self.sync_flags();
    }

    fn undo(&self) -> bool {
        let target = {
            let mut stacks = self.stacks.borrow_mut();
            if stacks.undo.len() <= 1 {
                return false;
            }
            let Some(top) = stacks.undo.pop() else {
                return false;
            };
            stacks.redo.push(top);
            stacks.undo.last().map(|r| (self.snapshot)(&r.snapshot))
        };
        if let Some(value) = target {
            self.write_source(value);
        }
        self.sync_flags();
        true
    }

    fn redo(&self) -> bool {
        let target = {
            let mut stacks = self.stacks.borrow_mut();
            let Some(record) = stacks.redo.pop() else {
                return false;
            };
            let value = (self.snapshot)(&record.snapshot);
            stacks.undo.push(record);
            value
        };
        self.write_source(target);
        self.sync_flags();
        true
    }

    fn clear(&self) {
        let record = self.record();
        {
            let mut stacks = self.stacks.borrow_mut();
            stacks.undo.clear();
            stacks.undo.push(record);
            stacks.redo.clear();
        }
        tracing::debug!("history cleared");
        self.sync_flags();
    }

    fn reset(&self) {
        let target = self
            .stacks
            .borrow()
            .undo
            .last()
            .map(|r| (self.snapshot)(&r.snapshot));
        if let Some(value) = target {
            self.write_source(value);
        }
    }

    /// Write into the source without the watcher committing it.
    fn write_source(&self, value: T) {
        self.ignore_next.set(self.watched);
        self.source.replace(value);
        self.ignore_next.set(false);
    }

    fn sync_flags(&self) {
        let (undo, redo) = {
            let stacks = self.stacks.borrow();
            (stacks.undo.len() > 1, !stacks.redo.is_empty())
        };
        self.can_undo.set(undo);
        self.can_redo.set(redo);
    }
}

/// Bounded undo/redo history of an observable's value.
///
/// # Example
///
/// ```
/// use cadence_core::Observable;
/// use cadence_runtime::undo::{CommitHistory, HistoryOptions};
///
/// let text = Observable::new(String::from("a"));
/// let history = CommitHistory::manual(&text, HistoryOptions::default());
///
/// text.set("ab".into());
/// history.commit();
/// assert!(history.can_undo().get());
///
/// history.undo();
/// assert_eq!(text.get(), "a");
/// history.redo();
/// assert_eq!(text.get(), "ab");
/// ```
pub struct CommitHistory<T: 'static> {
    inner: Rc<HistoryInner<T>>,
    trigger: CommitTrigger,
    gate: Option<Rc<dyn Gate>>,
    _watcher: Option<Subscription>,
}

impl<T: fmt::Debug + 'static> fmt::Debug for CommitHistory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stacks = self.inner.stacks.borrow();
        f.debug_struct("CommitHistory")
            .field("trigger", &self.trigger)
            .field("capacity", &self.inner.capacity)
            .field("undo", &stacks.undo.len())
            .field("redo", &stacks.redo.len())
            .finish()
    }
}

#[allow(clippy::len_without_is_empty)]
impl<T: Clone + 'static> CommitHistory<T> {
    /// History that commits only when [`commit`](Self::commit) is called.
    pub fn manual(source: &Observable<T>, options: HistoryOptions<T>) -> Self {
        let inner = Self::build(source, options, Clock::Real, false);
        Self {
            inner,
            trigger: CommitTrigger::Manual,
            gate: None,
            _watcher: None,
        }
    }

    /// History that commits on every change of `source`.
    pub fn tracked(source: &Observable<T>, options: HistoryOptions<T>) -> Self {
        let inner = Self::build(source, options, Clock::Real, true);
        let watcher = Self::watch_source(&inner, |inner| inner.commit());
        Self {
            inner,
            trigger: CommitTrigger::EveryChange,
            gate: None,
            _watcher: Some(watcher),
        }
    }

    /// History that commits once `source` has been stable for `window`.
    pub fn debounced(
        source: &Observable<T>,
        window: Duration,
        scheduler: &Scheduler,
        options: HistoryOptions<T>,
    ) -> Self {
        let inner = Self::build(source, options, scheduler.clock(), true);
        let weak = Rc::downgrade(&inner);
        let gate = Rc::new(Debouncer::new(scheduler, window, move |()| {
            Self::commit_weak(&weak);
        }));
        let g = Rc::clone(&gate);
        let watcher = Self::watch_source(&inner, move |_| g.call(()));
        Self {
            inner,
            trigger: CommitTrigger::Debounced(window),
            gate: Some(gate),
            _watcher: Some(watcher),
        }
    }

    /// History that commits at most once per `window`, with the first change
    /// of an idle period committed immediately and one trailing commit.
    pub fn throttled(
        source: &Observable<T>,
        window: Duration,
        scheduler: &Scheduler,
        options: HistoryOptions<T>,
    ) -> Self {
        let inner = Self::build(source, options, scheduler.clock(), true);
        let weak = Rc::downgrade(&inner);
        let gate = Rc::new(Throttler::new(scheduler, window, move |()| {
            Self::commit_weak(&weak);
        }));
        let g = Rc::clone(&gate);
        let watcher = Self::watch_source(&inner, move |_| g.call(()));
        Self {
            inner,
            trigger: CommitTrigger::Throttled(window),
            gate: Some(gate),
            _watcher: Some(watcher),
        }
    }

    fn build(
        source: &Observable<T>,
        options: HistoryOptions<T>,
        fallback_clock: Clock,
        watched: bool,
    ) -> Rc<HistoryInner<T>> {
        let snapshot = options
            .snapshot
            .unwrap_or_else(|| Rc::new(|v: &T| v.clone()) as SnapshotFn<T>);
        let clock = options.clock.unwrap_or(fallback_clock);
        let initial = HistoryRecord::new(source.with(|v| snapshot(v)), clock.unix_millis());
        Rc::new(HistoryInner {
            source: source.clone(),
            stacks: RefCell::new(Stacks {
                undo: vec![initial],
                redo: Vec::new(),
            }),
            capacity: options.capacity,
            snapshot,
            clock,
            watched,
            ignore_next: Cell::new(false),
            can_undo: Observable::new(false),
            can_redo: Observable::new(false),
        })
    }

    fn watch_source(
        inner: &Rc<HistoryInner<T>>,
        on_change: impl Fn(&HistoryInner<T>) + 'static,
    ) -> Subscription {
        let weak = Rc::downgrade(inner);
        inner.source.subscribe(move |_| {
            let Some(inner) = weak.upgrade() else { return };
            if inner.ignore_next.replace(false) {
                return;
            }
            on_change(&inner);
        })
    }

    fn commit_weak(weak: &Weak<HistoryInner<T>>) {
        if let Some(inner) = weak.upgrade() {
            inner.commit();
        }
    }

    fn cancel_pending(&self) {
        if let Some(gate) = &self.gate {
            gate.cancel();
        }
    }

    /// Push a record of the source's current value and clear the redo stack.
    ///
    /// Supersedes a commit still waiting on the gate.
    pub fn commit(&self) {
        self.cancel_pending();
        self.inner.commit();
    }

    /// Step back one record. Returns `false` when already at the oldest record.
    pub fn undo(&self) -> bool {
        self.cancel_pending();
        self.inner.undo()
    }

    /// Re-apply the most recently undone record. Returns `false` when there is
    /// nothing to redo.
    pub fn redo(&self) -> bool {
        self.cancel_pending();
        self.inner.redo()
    }

    /// Drop all records and start over from the source's current value.
    pub fn clear(&self) {
        self.cancel_pending();
        self.inner.clear();
    }

    /// Write the newest record back into the source, discarding uncommitted
    /// changes. The stacks are unchanged.
    pub fn reset(&self) {
        self.cancel_pending();
        self.inner.reset();
    }

    /// Undo records, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryRecord<T>> {
        self.inner.stacks.borrow().undo.clone()
    }

    /// Redo records, next-to-redo last.
    #[must_use]
    pub fn redo_history(&self) -> Vec<HistoryRecord<T>> {
        self.inner.stacks.borrow().redo.clone()
    }

    /// Number of undo records (always at least 1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.stacks.borrow().undo.len()
    }

    /// The newest undo record.
    #[must_use]
    pub fn last(&self) -> HistoryRecord<T> {
        let last = self.inner.stacks.borrow().undo.last().cloned();
        // The undo stack always holds at least one record; a fresh record of
        // the source stands in if that ever breaks.
        last.unwrap_or_else(|| self.inner.record())
    }

    /// The tracked source.
    #[must_use]
    pub fn source(&self) -> &Observable<T> {
        &self.inner.source
    }

    /// `true` while there is a record to undo to.
    #[must_use]
    pub fn can_undo(&self) -> &Observable<bool> {
        &self.inner.can_undo
    }

    /// `true` while there is a record to redo.
    #[must_use]
    pub fn can_redo(&self) -> &Observable<bool> {
        &self.inner.can_redo
    }

    /// Configured capacity.
    #[must_use]
    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.inner.capacity
    }

    /// How this history commits.
    #[must_use]
    pub fn trigger(&self) -> CommitTrigger {
        self.trigger
    }

    /// Whether a gated commit is waiting.
    #[must_use]
    pub fn is_commit_pending(&self) -> bool {
        self.gate.as_ref().is_some_and(|g| g.is_pending())
    }
}
