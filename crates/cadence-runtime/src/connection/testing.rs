#![forbid(unsafe_code)]

//! In-memory connector for tests.
//!
//! [`MockConnector`] is a cloneable handle: hand one clone to a connection and
//! keep the other to drive the transports it creates. The `simulate_*`
//! methods act on the most recently created transport and deliver their
//! events synchronously, the way a socket library calling back into the
//! connection would.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::error::TransportError;
use super::status::ConnectionStatus;
use super::transport::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, CloseEvent, ConnectRequest, Connector, MessageEvent, Transport,
    TransportEvents,
};

type CloseArgs = (Option<u16>, Option<String>);

struct MockConn {
    events: TransportEvents,
    state: ConnectionStatus,
    sent: Vec<String>,
    closed_with: Option<CloseArgs>,
}

#[derive(Default)]
struct MockNet {
    requests: Vec<ConnectRequest>,
    connections: Vec<Rc<RefCell<MockConn>>>,
    fail_connect: Option<TransportError>,
    hold_close: bool,
    fail_sends: bool,
}

/// Scriptable [`Connector`] whose transports live in memory.
#[derive(Clone, Default)]
pub struct MockConnector {
    net: Rc<RefCell<MockNet>>,
}

impl fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let net = self.net.borrow();
        f.debug_struct("MockConnector")
            .field("attempts", &net.requests.len())
            .field("connections", &net.connections.len())
            .field("failing", &net.fail_connect.is_some())
            .finish()
    }
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose every connect attempt fails.
    #[must_use]
    pub fn always_failing() -> Self {
        let mock = Self::new();
        mock.fail_connects(true);
        mock
    }

    /// Transports record `close()` but wait for
    /// [`confirm_close`](Self::confirm_close) before reporting it.
    #[must_use]
    pub fn hold_close(self) -> Self {
        self.net.borrow_mut().hold_close = true;
        self
    }

    /// Make subsequent connect attempts fail (or succeed again).
    pub fn fail_connects(&self, fail: bool) {
        self.net.borrow_mut().fail_connect =
            fail.then(|| TransportError::Connect("connection refused".into()));
    }

    /// Make transport sends fail (or succeed again).
    pub fn fail_sends(&self, fail: bool) {
        self.net.borrow_mut().fail_sends = fail;
    }

    /// Number of connect attempts, successful or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.net.borrow().requests.len()
    }

    /// Number of transports created.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.net.borrow().connections.len()
    }

    #[must_use]
    pub fn last_request(&self) -> Option<ConnectRequest> {
        self.net.borrow().requests.last().cloned()
    }

    /// Payloads sent on the latest transport.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.latest()
            .map(|c| c.borrow().sent.clone())
            .unwrap_or_default()
    }

    /// Payloads sent on transport `index`.
    #[must_use]
    pub fn sent_at(&self, index: usize) -> Vec<String> {
        self.at(index)
            .map(|c| c.borrow().sent.clone())
            .unwrap_or_default()
    }

    /// Arguments of the latest transport's `close()` call.
    #[must_use]
    pub fn closed_with(&self) -> Option<CloseArgs> {
        self.latest().and_then(|c| c.borrow().closed_with.clone())
    }

    /// Arguments of transport `index`'s `close()` call.
    #[must_use]
    pub fn closed_with_at(&self, index: usize) -> Option<CloseArgs> {
        self.at(index).and_then(|c| c.borrow().closed_with.clone())
    }

    /// Event handle of transport `index`.
    #[must_use]
    pub fn events(&self, index: usize) -> Option<TransportEvents> {
        self.at(index).map(|c| c.borrow().events.clone())
    }

    /// Ready state of the latest transport.
    #[must_use]
    pub fn ready_state(&self) -> Option<ConnectionStatus> {
        self.latest().map(|c| c.borrow().state)
    }

    pub fn simulate_open(&self) {
        if let Some(events) = self.transition(ConnectionStatus::Open) {
            events.opened();
        }
    }

    pub fn simulate_message(&self, data: &str) {
        self.simulate(MessageEvent::text(data));
    }

    pub fn simulate(&self, message: MessageEvent) {
        if let Some(events) = self.events_of_latest() {
            events.message(message);
        }
    }

    /// Report an error without closing the transport.
    pub fn simulate_error(&self, error: TransportError) {
        if let Some(events) = self.events_of_latest() {
            events.error(error);
        }
    }

    /// Mark the transport closed, then report an error.
    pub fn simulate_fatal_error(&self, error: TransportError) {
        if let Some(events) = self.transition(ConnectionStatus::Closed) {
            events.error(error);
        }
    }

    /// The remote end closed the transport.
    pub fn simulate_close(&self, code: u16, reason: &str) {
        if let Some(events) = self.transition(ConnectionStatus::Closed) {
            events.closed(CloseEvent {
                code,
                reason: reason.to_string(),
                was_clean: code != CLOSE_ABNORMAL,
            });
        }
    }

    /// Complete a close held by [`hold_close`](Self::hold_close).
    pub fn confirm_close(&self) {
        let Some(conn) = self.latest() else { return };
        let (code, reason) = conn.borrow().closed_with.clone().unwrap_or((None, None));
        if let Some(events) = self.transition(ConnectionStatus::Closed) {
            events.closed(close_event(code, reason.as_deref()));
        }
    }

    fn latest(&self) -> Option<Rc<RefCell<MockConn>>> {
        self.net.borrow().connections.last().cloned()
    }

    fn at(&self, index: usize) -> Option<Rc<RefCell<MockConn>>> {
        self.net.borrow().connections.get(index).cloned()
    }

    fn events_of_latest(&self) -> Option<TransportEvents> {
        self.latest().map(|c| c.borrow().events.clone())
    }

    /// Set the latest transport's state; returns its events handle with no
    /// borrow held.
    fn transition(&self, state: ConnectionStatus) -> Option<TransportEvents> {
        let cell = self.latest()?;
        let mut conn = cell.borrow_mut();
        conn.state = state;
        Some(conn.events.clone())
    }
}

impl Connector for MockConnector {
    fn connect(
        &mut self,
        request: &ConnectRequest,
        events: TransportEvents,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut net = self.net.borrow_mut();
        net.requests.push(request.clone());
        if let Some(err) = net.fail_connect.clone() {
            return Err(err);
        }
        let conn = Rc::new(RefCell::new(MockConn {
            events,
            state: ConnectionStatus::Connecting,
            sent: Vec::new(),
            closed_with: None,
        }));
        net.connections.push(Rc::clone(&conn));
        Ok(Box::new(MockTransport {
            conn,
            net: Rc::clone(&self.net),
        }))
    }
}

struct MockTransport {
    conn: Rc<RefCell<MockConn>>,
    net: Rc<RefCell<MockNet>>,
}

impl Transport for MockTransport {
    fn ready_state(&self) -> ConnectionStatus {
        self.conn.borrow().state
    }

    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        if self.net.borrow().fail_sends {
            return Err(TransportError::Send("mock send failure".into()));
        }
        let mut conn = self.conn.borrow_mut();
        if !conn.state.is_open() {
            return Err(TransportError::Send(format!("transport is {}", conn.state)));
        }
        conn.sent.push(payload.to_string());
        Ok(())
    }

    fn close(&mut self, code: Option<u16>, reason: Option<&str>) {
        let hold = self.net.borrow().hold_close;
        let events = {
            let mut conn = self.conn.borrow_mut();
            conn.closed_with = Some((code, reason.map(str::to_string)));
            conn.state = if hold {
                ConnectionStatus::Closing
            } else {
                ConnectionStatus::Closed
            };
            conn.events.clone()
        };
        if !hold {
            events.closed(close_event(code, reason));
        }
    }
}

fn close_event(code: Option<u16>, reason: Option<&str>) -> CloseEvent {
    CloseEvent::new(code.unwrap_or(CLOSE_NORMAL), reason.unwrap_or(""))
}
