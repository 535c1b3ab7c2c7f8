#![forbid(unsafe_code)]

//! Undo/redo history for observable values.
//!
//! A [`CommitHistory`] keeps two stacks of [`HistoryRecord`]s over a source
//! [`Observable`](cadence_core::Observable). Records are pushed by commits:
//!
//! | Constructor | Commits on |
//! |-------------|------------|
//! | [`CommitHistory::manual`] | explicit [`commit`](CommitHistory::commit) only |
//! | [`CommitHistory::tracked`] | every source change |
//! | [`CommitHistory::debounced`] | the end of each burst of changes |
//! | [`CommitHistory::throttled`] | the first change, then at most once per window |
//!
//! Undo and redo write snapshots back into the source. The watching variants
//! mark those writes with a one-shot ignore flag so they are never committed
//! again. Undo, redo, clear and reset also discard a commit still waiting on
//! the gate.

mod history;
mod record;

pub use history::{CommitHistory, CommitTrigger};
pub use record::{HistoryOptions, HistoryRecord};
