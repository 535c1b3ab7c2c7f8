#![forbid(unsafe_code)]

//! Core: observables, clocks, and the timer scheduler.
//!
//! Everything in Cadence is single-threaded. Values live in
//! [`Observable`](reactive::Observable)s, time is read through a
//! [`Clock`](clock::Clock), and delayed work is owned by a
//! [`Scheduler`](timer::Scheduler) that the application's event loop (or a
//! test holding a [`LabClock`](clock::LabClock)) drives.

pub mod clock;
mod logging;
pub mod reactive;
pub mod timer;

pub use clock::{Clock, LabClock};
pub use reactive::{Observable, Subscription};
pub use timer::{Scheduler, TimerId, TimerSlot};
