#![forbid(unsafe_code)]

use std::fmt;
use std::rc::Rc;

use cadence_core::{Observable, Scheduler};

use super::error::TransportError;
use super::link::{Link, LinkConfig, LinkKind};
use super::options::EventStreamOptions;
use super::status::ConnectionStatus;
use super::transport::{ConnectRequest, Connector};

/// A server-push, EventSource-like stream.
///
/// Never reports `Closing`: [`close`](Self::close) goes straight to `Closed`,
/// and opening again creates a fresh transport. An error reported while the
/// transport's own ready state is closed ends the stream (and may schedule a
/// reconnect). Dropping the stream closes it.
pub struct EventStream {
    link: Rc<Link>,
    events: Vec<String>,
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("link", &self.link)
            .field("events", &self.events)
            .finish()
    }
}

impl EventStream {
    /// Create a stream from `url`. Connects right away unless
    /// [`EventStreamOptions::immediate`] is `false`.
    pub fn new(
        url: impl Into<String>,
        connector: impl Connector + 'static,
        scheduler: &Scheduler,
        options: EventStreamOptions,
    ) -> Self {
        let immediate = options.immediate;
        let events = options.events;
        let config = LinkConfig {
            kind: LinkKind::Push,
            request: ConnectRequest {
                url: url.into(),
                with_credentials: options.with_credentials,
                events: events.clone(),
                ..ConnectRequest::default()
            },
            reconnect: options.reconnect,
            heartbeat: None,
            callbacks: options.callbacks,
        };
        let link = Link::new(config, Box::new(connector), scheduler);
        if immediate {
            link.open();
        }
        Self { link, events }
    }

    /// (Re)connect with a fresh transport.
    pub fn open(&self) {
        self.link.open();
    }

    /// Close the stream immediately. No reconnect follows.
    pub fn close(&self) {
        self.link.close(None, None);
    }

    #[must_use]
    pub fn status(&self) -> &Observable<ConnectionStatus> {
        &self.link.status
    }

    /// Payload of the last event.
    #[must_use]
    pub fn data(&self) -> &Observable<Option<String>> {
        &self.link.data
    }

    /// Name of the last event; `"message"` for unnamed ones.
    #[must_use]
    pub fn event(&self) -> &Observable<Option<String>> {
        &self.link.event
    }

    /// Id of the last event that carried one.
    #[must_use]
    pub fn last_event_id(&self) -> &Observable<Option<String>> {
        &self.link.last_event_id
    }

    /// Last transport error; cleared when the stream opens.
    #[must_use]
    pub fn error(&self) -> &Observable<Option<TransportError>> {
        &self.link.error
    }

    /// Named events this stream listens for.
    #[must_use]
    pub fn events(&self) -> &[String] {
        &self.events
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.link.url()
    }

    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.link.retry_count()
    }

    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        self.link.connect_attempts()
    }

    #[must_use]
    pub fn is_transport_live(&self) -> bool {
        self.link.is_transport_live()
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.link.close(None, None);
    }
}
