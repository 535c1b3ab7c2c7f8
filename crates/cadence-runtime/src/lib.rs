#![forbid(unsafe_code)]

//! Runtime utilities built on `cadence-core`.
//!
//! - [`rate_limit`]: debounce and throttle over observables and callbacks.
//! - [`undo`]: commit-based undo/redo history for an observable.
//! - [`task_queue`]: run async tasks one after another with observable progress.
//! - [`connection`]: reactive sockets and server-push streams with reconnect.
//!
//! All of it is single-threaded and advances through a shared
//! [`Scheduler`](cadence_core::Scheduler).

pub mod connection;
pub mod rate_limit;
pub mod task_queue;
pub mod undo;
