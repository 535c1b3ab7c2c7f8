#![forbid(unsafe_code)]

//! Reactive connections: a bidirectional [`Socket`] and a server-push
//! [`EventStream`].
//!
//! Both expose their state as observables (`status`, `data`, `error`) and
//! drive a [`Transport`] obtained from a caller-supplied [`Connector`]. The
//! transport reports back through [`TransportEvents`]; the connection reacts
//! with reconnects and heartbeats scheduled on a
//! [`Scheduler`](cadence_core::Scheduler).
//!
//! | Type | Closing state | Heartbeat | Event metadata |
//! |------|---------------|-----------|----------------|
//! | [`Socket`] | yes, until the transport confirms | optional | no |
//! | [`EventStream`] | no | no | `event`, `last_event_id` |
//!
//! [`ChannelRegistry`] keeps long-lived connections by id. [`testing`] holds
//! an in-memory [`Connector`] for driving connections in tests.
//!
//! # Failure Modes
//!
//! - **Connect failure**: reported as an error followed by an abnormal close
//!   ([`CLOSE_ABNORMAL`]), which feeds the reconnect policy.
//! - **Retries exhausted**: the connection stays `Closed` and logs a warning.
//!   Only an explicit `open()` starts over.
//! - **Send while not open**: [`ConnectionError::NotOpen`].

mod error;
mod event_stream;
mod link;
mod options;
mod registry;
mod socket;
mod status;
pub mod testing;
mod transport;

pub use error::{ConnectionError, TransportError};
pub use event_stream::EventStream;
pub use options::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_MESSAGE, DEFAULT_RECONNECT_DELAY,
    DEFAULT_RETRIES, EventStreamOptions, HeartbeatConfig, ReconnectPolicy, SocketOptions,
};
pub use registry::{Channel, ChannelId, ChannelRegistry};
pub use socket::Socket;
pub use status::ConnectionStatus;
pub use transport::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, CloseEvent, ConnectRequest, Connector, MessageEvent, Transport,
    TransportEvents,
};
