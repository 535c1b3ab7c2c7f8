#![forbid(unsafe_code)]

//! Shared connection state machine behind [`Socket`](super::Socket) and
//! [`EventStream`](super::EventStream).
//!
//! # Invariants
//!
//! 1. At most one transport is live. Replacing or losing a transport bumps the
//!    generation, and events tagged with an older generation are dropped.
//! 2. At most one reconnect timer and one heartbeat interval exist, each in its
//!    own [`TimerSlot`].
//! 3. The retry counter resets on `Open` and on an explicit `open()`, never on
//!    a reconnect attempt.
//! 4. After an explicit close no transport is adopted or reported `Open`
//!    until the next `open()`.
//! 5. No `RefCell` borrow is held while observables notify or callbacks run.
//!    Transport events raised during an operation are queued and dispatched
//!    after it, in arrival order.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use cadence_core::{Observable, Scheduler, TimerSlot};

use super::error::{ConnectionError, TransportError};
use super::options::{Callbacks, HeartbeatConfig, ReconnectPolicy};
use super::status::ConnectionStatus;
use super::transport::{
    CloseEvent, ConnectRequest, Connector, MessageEvent, Transport, TransportEvent, TransportEvents,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkKind {
    /// Bidirectional socket: graceful `Closing`, heartbeat.
    Duplex,
    /// Server push stream: closes immediately, named events.
    Push,
}

pub(crate) struct LinkConfig {
    pub(crate) kind: LinkKind,
    pub(crate) request: ConnectRequest,
    pub(crate) reconnect: ReconnectPolicy,
    pub(crate) heartbeat: Option<HeartbeatConfig>,
    pub(crate) callbacks: Callbacks,
}

struct LinkState {
    transport: Option<Box<dyn Transport>>,
    generation: u64,
    retries: u32,
    connect_attempts: u64,
    explicitly_closed: bool,
    reconnect: TimerSlot,
    heartbeat: TimerSlot,
}

pub(crate) struct Link {
    kind: LinkKind,
    request: ConnectRequest,
    policy: ReconnectPolicy,
    heartbeat: Option<HeartbeatConfig>,
    connector: RefCell<Box<dyn Connector>>,
    state: RefCell<LinkState>,
    inbox: RefCell<VecDeque<(u64, TransportEvent)>>,
    busy: Cell<bool>,
    callbacks: RefCell<Callbacks>,
    pub(crate) status: Observable<ConnectionStatus>,
    pub(crate) data: Observable<Option<String>>,
    pub(crate) event: Observable<Option<String>>,
    pub(crate) last_event_id: Observable<Option<String>>,
    pub(crate) error: Observable<Option<TransportError>>,
    this: Weak<Link>,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Link")
            .field("kind", &self.kind)
            .field("url", &self.request.url)
            .field("status", &self.status.get())
            .field("generation", &state.generation)
            .field("retries", &state.retries)
            .field("transport_live", &state.transport.is_some())
            .finish()
    }
}

enum CloseOutcome {
    Reconnect { attempt: u32 },
    Exhausted,
    Stay,
}

impl Link {
    pub(crate) fn new(
        config: LinkConfig,
        connector: Box<dyn Connector>,
        scheduler: &Scheduler,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            kind: config.kind,
            request: config.request,
            policy: config.reconnect,
            heartbeat: config.heartbeat,
            connector: RefCell::new(connector),
            state: RefCell::new(LinkState {
                transport: None,
                generation: 0,
                retries: 0,
                connect_attempts: 0,
                explicitly_closed: false,
                reconnect: TimerSlot::new(scheduler),
                heartbeat: TimerSlot::new(scheduler),
            }),
            inbox: RefCell::new(VecDeque::new()),
            busy: Cell::new(false),
            callbacks: RefCell::new(config.callbacks),
            status: Observable::new(ConnectionStatus::Closed),
            data: Observable::new(None),
            event: Observable::new(None),
            last_event_id: Observable::new(None),
            error: Observable::new(None),
            this: this.clone(),
        })
    }

    pub(crate) fn url(&self) -> &str {
        &self.request.url
    }

    pub(crate) fn retry_count(&self) -> u32 {
        self.state.borrow().retries
    }

    pub(crate) fn connect_attempts(&self) -> u64 {
        self.state.borrow().connect_attempts
    }

    pub(crate) fn is_transport_live(&self) -> bool {
        self.state.borrow().transport.is_some()
    }

    pub(crate) fn is_reconnect_pending(&self) -> bool {
        self.state.borrow().reconnect.is_armed()
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.state
            .try_borrow()
            .is_ok_and(|state| state.generation == generation && state.transport.is_some())
    }

    // ─── Operations ──────────────────────────────────────────────────────────

    /// Run `op` as one operation: transport events raised inside it are
    /// dispatched after it returns.
    fn operation<R>(&self, op: impl FnOnce() -> R) -> R {
        let nested = self.busy.replace(true);
        let out = op();
        if !nested {
            self.busy.set(false);
            self.drain();
        }
        out
    }

    /// Explicit open: resets the retry budget and cancels a pending reconnect.
    pub(crate) fn open(&self) {
        self.operation(|| {
            {
                let mut state = self.state.borrow_mut();
                state.explicitly_closed = false;
                state.retries = 0;
                state.reconnect.clear();
            }
            self.connect();
        });
    }

    pub(crate) fn close(&self, code: Option<u16>, reason: Option<&str>) {
        self.operation(|| {
            let status = self.status.get();
            let transport = {
                let mut state = self.state.borrow_mut();
                state.explicitly_closed = true;
                state.reconnect.clear();
                state.heartbeat.clear();
                match self.kind {
                    LinkKind::Duplex => None,
                    LinkKind::Push => {
                        state.generation += 1;
                        state.transport.take()
                    }
                }
            };
            match self.kind {
                LinkKind::Duplex => {
                    if matches!(status, ConnectionStatus::Open | ConnectionStatus::Connecting) {
                        self.status.set(ConnectionStatus::Closing);
                        tracing::debug!(url = %self.url(), ?code, "closing");
                        if let Some(t) = self.state.borrow_mut().transport.as_mut() {
                            t.close(code, reason);
                        }
                    }
                }
                LinkKind::Push => {
                    if let Some(mut t) = transport {
                        t.close(code, reason);
                    }
                    tracing::debug!(url = %self.url(), "stream closed");
                    self.status.set(ConnectionStatus::Closed);
                }
            }
        });
    }

    pub(crate) fn send(&self, payload: &str) -> Result<(), ConnectionError> {
        self.operation(|| {
            let status = self.status.get();
            if !status.is_open() {
                return Err(ConnectionError::NotOpen { status });
            }
            let mut state = self.state.borrow_mut();
            match state.transport.as_mut() {
                Some(t) => t.send(payload).map_err(ConnectionError::from),
                None => Err(ConnectionError::NotOpen { status }),
            }
        })
    }

    /// Dispose of any current transport and create a new one.
    fn connect(&self) {
        let (previous, generation, attempt) = {
            let mut state = self.state.borrow_mut();
            state.generation += 1;
            state.connect_attempts += 1;
            state.heartbeat.clear();
            (state.transport.take(), state.generation, state.connect_attempts)
        };
        if let Some(mut old) = previous {
            if matches!(
                old.ready_state(),
                ConnectionStatus::Open | ConnectionStatus::Connecting
            ) {
                old.close(None, None);
            }
            tracing::debug!(url = %self.url(), "previous transport disposed");
        }

        self.status.set(ConnectionStatus::Connecting);
        tracing::debug!(url = %self.url(), attempt, "connecting");

        let events = TransportEvents::new(self.this.clone(), generation);
        let result = self.connector.borrow_mut().connect(&self.request, events);
        match result {
            Ok(transport) => {
                let abandoned = {
                    let mut state = self.state.borrow_mut();
                    let current = state.generation == generation;
                    if current && !state.explicitly_closed {
                        state.transport = Some(transport);
                        None
                    } else {
                        Some((transport, current))
                    }
                };
                if let Some((mut t, current)) = abandoned {
                    if matches!(
                        t.ready_state(),
                        ConnectionStatus::Open | ConnectionStatus::Connecting
                    ) {
                        t.close(None, None);
                    }
                    drop(t);
                    tracing::debug!(url = %self.url(), "transport closed before adoption");
                    if current {
                        self.handle_closed(&CloseEvent::normal());
                    }
                }
            }
            Err(err) => {
                tracing::debug!(url = %self.url(), error = %err, "connect failed");
                let mut inbox = self.inbox.borrow_mut();
                inbox.push_back((generation, TransportEvent::Error(err)));
                inbox.push_back((generation, TransportEvent::Closed(CloseEvent::abnormal())));
            }
        }
    }

    fn reconnect(&self) {
        self.operation(|| {
            if self.state.borrow().explicitly_closed {
                return;
            }
            self.connect();
        });
    }

    fn heartbeat_tick(&self) {
        let Some(message) = self.heartbeat.as_ref().map(|h| h.message.as_str()) else {
            return;
        };
        self.operation(|| {
            if !self.status.get().is_open() {
                return;
            }
            let result = {
                let mut state = self.state.borrow_mut();
                state.transport.as_mut().map(|t| t.send(message))
            };
            if let Some(Err(err)) = result {
                tracing::warn!(url = %self.url(), error = %err, "heartbeat send failed");
            }
        });
    }

    // ─── Event dispatch ──────────────────────────────────────────────────────

    pub(crate) fn enqueue(&self, generation: u64, event: TransportEvent) {
        self.inbox.borrow_mut().push_back((generation, event));
        self.drain();
    }

    fn drain(&self) {
        if self.busy.replace(true) {
            return;
        }
        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some((generation, event)) = next else { break };
            let current = self.state.borrow().generation;
            if generation != current {
                tracing::trace!(url = %self.url(), generation, current, "stale transport event dropped");
                continue;
            }
            self.dispatch(event);
        }
        self.busy.set(false);
    }

    fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.handle_opened(),
            TransportEvent::Message(message) => self.handle_message(message),
            TransportEvent::Error(err) => self.handle_error(err),
            TransportEvent::Closed(close) => self.handle_closed(&close),
        }
    }

    fn handle_opened(&self) {
        if self.state.borrow().explicitly_closed {
            let mut state = self.state.borrow_mut();
            if let Some(t) = state.transport.as_mut()
                && matches!(
                    t.ready_state(),
                    ConnectionStatus::Open | ConnectionStatus::Connecting
                )
            {
                t.close(None, None);
            }
            tracing::debug!(url = %self.url(), "open after close ignored");
            return;
        }
        {
            let mut state = self.state.borrow_mut();
            state.retries = 0;
            if self.kind == LinkKind::Duplex
                && let Some(hb) = &self.heartbeat
            {
                let weak = self.this.clone();
                state.heartbeat.arm_interval(hb.interval, move || {
                    if let Some(link) = weak.upgrade() {
                        link.heartbeat_tick();
                    }
                });
            }
        }
        self.error.set(None);
        self.status.set(ConnectionStatus::Open);
        tracing::debug!(url = %self.url(), "open");
        if let Some(f) = self.callbacks.borrow_mut().on_connected.as_mut() {
            f();
        }
    }

    fn handle_message(&self, message: MessageEvent) {
        self.data.replace(Some(message.data.clone()));
        if self.kind == LinkKind::Push {
            self.event.replace(Some(message.event_name().to_string()));
            if let Some(id) = &message.last_event_id {
                self.last_event_id.set(Some(id.clone()));
            }
        }
        if let Some(f) = self.callbacks.borrow_mut().on_message.as_mut() {
            f(&message);
        }
    }

    fn handle_error(&self, err: TransportError) {
        tracing::debug!(url = %self.url(), error = %err, "transport error");
        self.error.replace(Some(err.clone()));
        if let Some(f) = self.callbacks.borrow_mut().on_error.as_mut() {
            f(&err);
        }
        let closed = self
            .state
            .borrow()
            .transport
            .as_ref()
            .is_some_and(|t| t.ready_state().is_closed());
        if closed {
            self.handle_closed(&CloseEvent::abnormal());
        }
    }

    fn handle_closed(&self, close: &CloseEvent) {
        let (outcome, finished) = {
            let mut state = self.state.borrow_mut();
            state.generation += 1;
            state.heartbeat.clear();
            let finished = state.transport.take();
            let outcome = if state.explicitly_closed {
                CloseOutcome::Stay
            } else if self.policy.allows(state.retries) {
                state.retries += 1;
                CloseOutcome::Reconnect {
                    attempt: state.retries,
                }
            } else if self.policy == ReconnectPolicy::Disabled {
                CloseOutcome::Stay
            } else {
                CloseOutcome::Exhausted
            };
            if let (CloseOutcome::Reconnect { .. }, Some(delay)) = (&outcome, self.policy.delay()) {
                let weak = self.this.clone();
                state.reconnect.arm_timeout(delay, move || {
                    if let Some(link) = weak.upgrade() {
                        link.reconnect();
                    }
                });
            }
            (outcome, finished)
        };
        drop(finished);

        self.status.set(ConnectionStatus::Closed);
        tracing::debug!(url = %self.url(), code = close.code, clean = close.was_clean, "closed");
        match outcome {
            CloseOutcome::Reconnect { attempt } => {
                tracing::debug!(url = %self.url(), attempt, "reconnect scheduled");
            }
            CloseOutcome::Exhausted => {
                tracing::warn!(url = %self.url(), "reconnect attempts exhausted");
            }
            CloseOutcome::Stay => {}
        }
        if let Some(f) = self.callbacks.borrow_mut().on_disconnected.as_mut() {
            f(close);
        }
    }
}
