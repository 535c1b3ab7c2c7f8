#![forbid(unsafe_code)]

//! Cadence public facade crate.
//!
//! Time-aware reactive utilities: observables, a lab-clock timer scheduler,
//! debounce and throttle, undo history, task queues and reconnecting
//! connections.

pub mod prelude {
    pub use cadence_core::{Clock, LabClock, Observable, Scheduler, Subscription, TimerSlot};
    pub use cadence_runtime::connection::{
        Channel, ChannelRegistry, ConnectionStatus, Connector, EventStream, EventStreamOptions,
        HeartbeatConfig, ReconnectPolicy, Socket, SocketOptions,
    };
    pub use cadence_runtime::rate_limit::{
        Debouncer, Throttler, debounced, throttled, watch_debounced, watch_throttled,
    };
    pub use cadence_runtime::task_queue::{AsyncQueue, TaskResult, task};
    pub use cadence_runtime::undo::{CommitHistory, HistoryOptions};
}
