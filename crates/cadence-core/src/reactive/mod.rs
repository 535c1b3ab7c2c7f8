#![forbid(unsafe_code)]

//! Reactive values for Cadence.
//!
//! - [`Observable`]: a shared, version-tracked value with change notification.
//! - [`Subscription`]: RAII guard that detaches its listener on drop.
//!
//! # Architecture
//!
//! `Observable<T>` uses `Rc<RefCell<..>>` for single-threaded shared ownership.
//! Listeners are stored as `Weak` callbacks and pruned lazily during
//! notification. There is no dependency graph: every derived value in the
//! runtime crate is wired up with an explicit [`Observable::watch`].

pub mod observable;

pub use observable::{Observable, Subscription};
