#![forbid(unsafe_code)]

//! The seam between connections and the network.
//!
//! A [`Connector`] creates [`Transport`]s. Each transport reports what happens
//! to it through the [`TransportEvents`] handle it was created with. Events
//! are queued and dispatched once the connection's current operation has
//! returned, so a transport may report them synchronously from inside
//! `connect`, `send` or `close`.
//!
//! Every `TransportEvents` handle is bound to one transport. Once the
//! connection disposes of that transport the handle goes inert and its
//! events are dropped.

use std::rc::Weak;

use super::error::TransportError;
use super::link::Link;
use super::status::ConnectionStatus;

/// WebSocket close code for a normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// WebSocket close code for a connection lost without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// What a connector is asked to connect to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectRequest {
    pub url: String,
    /// Sub-protocols offered to the server (duplex sockets).
    pub protocols: Vec<String>,
    /// Whether cross-origin credentials are sent (push streams).
    pub with_credentials: bool,
    /// Named events the stream listens for besides `"message"` (push streams).
    pub events: Vec<String>,
}

/// A message received from the remote end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub data: String,
    /// Event name for push streams; `None` means `"message"`.
    pub event: Option<String>,
    pub last_event_id: Option<String>,
}

impl MessageEvent {
    /// An unnamed text message.
    #[must_use]
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            event: None,
            last_event_id: None,
        }
    }

    /// A message for the named event `event`.
    #[must_use]
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            event: Some(event.into()),
            last_event_id: None,
        }
    }

    #[must_use]
    pub fn with_last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = Some(id.into());
        self
    }

    /// The event name, defaulting to `"message"`.
    #[must_use]
    pub fn event_name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// How a transport closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

impl CloseEvent {
    /// A clean close with `code` and `reason`.
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// Clean close with [`CLOSE_NORMAL`].
    #[must_use]
    pub fn normal() -> Self {
        Self::new(CLOSE_NORMAL, "")
    }

    /// Unclean loss of the connection ([`CLOSE_ABNORMAL`]).
    #[must_use]
    pub fn abnormal() -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: String::new(),
            was_clean: false,
        }
    }
}

/// A live network channel.
pub trait Transport {
    /// The transport's own view of its state.
    fn ready_state(&self) -> ConnectionStatus;

    /// Write `payload` to the remote end.
    fn send(&mut self, payload: &str) -> Result<(), TransportError>;

    /// Start closing. Completion is reported with [`TransportEvents::closed`].
    fn close(&mut self, code: Option<u16>, reason: Option<&str>);
}

/// Factory for transports.
pub trait Connector {
    /// Create a transport for `request`, reporting its events to `events`.
    fn connect(
        &mut self,
        request: &ConnectRequest,
        events: TransportEvents,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

impl<F> Connector for F
where
    F: FnMut(&ConnectRequest, TransportEvents) -> Result<Box<dyn Transport>, TransportError>,
{
    fn connect(
        &mut self,
        request: &ConnectRequest,
        events: TransportEvents,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self(request, events)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum TransportEvent {
    Opened,
    Message(MessageEvent),
    Error(TransportError),
    Closed(CloseEvent),
}

/// Event sink handed to a transport at creation.
#[derive(Clone)]
pub struct TransportEvents {
    link: Weak<Link>,
    generation: u64,
}

impl std::fmt::Debug for TransportEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportEvents")
            .field("generation", &self.generation)
            .field("live", &self.is_live())
            .finish()
    }
}

impl TransportEvents {
    pub(crate) fn new(link: Weak<Link>, generation: u64) -> Self {
        Self { link, generation }
    }

    /// The transport finished opening.
    pub fn opened(&self) {
        self.deliver(TransportEvent::Opened);
    }

    /// A message arrived.
    pub fn message(&self, message: MessageEvent) {
        self.deliver(TransportEvent::Message(message));
    }

    /// The transport hit an error. Call [`closed`](Self::closed) as well if
    /// the error ended the transport.
    pub fn error(&self, error: TransportError) {
        self.deliver(TransportEvent::Error(error));
    }

    /// The transport closed.
    pub fn closed(&self, event: CloseEvent) {
        self.deliver(TransportEvent::Closed(event));
    }

    /// Whether the connection still listens to this handle.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.link
            .upgrade()
            .is_some_and(|link| link.is_current(self.generation))
    }

    fn deliver(&self, event: TransportEvent) {
        if let Some(link) = self.link.upgrade() {
            link.enqueue(self.generation, event);
        }
    }
}
