#![forbid(unsafe_code)]

use std::fmt;
use std::rc::Rc;

use cadence_core::{Observable, Scheduler};

use super::error::{ConnectionError, TransportError};
use super::link::{Link, LinkConfig, LinkKind};
use super::options::SocketOptions;
use super::status::ConnectionStatus;
use super::transport::{ConnectRequest, Connector};

/// A bidirectional, WebSocket-like connection with auto-reconnect and
/// heartbeat.
///
/// `Closed --open--> Connecting --opened--> Open --closed--> Closed`, and
/// `close()` from `Open`/`Connecting` passes through `Closing` until the
/// transport confirms. Dropping the socket closes it.
///
/// # Example
///
/// ```
/// use cadence_core::Scheduler;
/// use cadence_runtime::connection::testing::MockConnector;
/// use cadence_runtime::connection::{ConnectionStatus, Socket, SocketOptions};
///
/// let (sched, _lab) = Scheduler::lab();
/// let net = MockConnector::new();
/// let socket = Socket::new("ws://example.test", net.clone(), &sched, SocketOptions::default());
/// assert_eq!(socket.status().get(), ConnectionStatus::Connecting);
///
/// net.simulate_open();
/// socket.send("hello").unwrap();
/// assert_eq!(net.sent(), vec!["hello"]);
/// ```
pub struct Socket {
    link: Rc<Link>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Socket").field(&self.link).finish()
    }
}

impl Socket {
    /// Create a socket to `url`. Connects right away unless
    /// [`SocketOptions::immediate`] is `false`.
    pub fn new(
        url: impl Into<String>,
        connector: impl Connector + 'static,
        scheduler: &Scheduler,
        options: SocketOptions,
    ) -> Self {
        let immediate = options.immediate;
        let config = LinkConfig {
            kind: LinkKind::Duplex,
            request: ConnectRequest {
                url: url.into(),
                protocols: options.protocols,
                ..ConnectRequest::default()
            },
            reconnect: options.reconnect,
            heartbeat: options.heartbeat,
            callbacks: options.callbacks,
        };
        let link = Link::new(config, Box::new(connector), scheduler);
        if immediate {
            link.open();
        }
        Self { link }
    }

    /// (Re)connect. Closes any live transport first and resets the retry
    /// budget.
    pub fn open(&self) {
        self.link.open();
    }

    /// Close the connection. No reconnect follows.
    pub fn close(&self, code: Option<u16>, reason: Option<&str>) {
        self.link.close(code, reason);
    }

    /// Send `payload`. Fails with [`ConnectionError::NotOpen`] unless open.
    pub fn send(&self, payload: &str) -> Result<(), ConnectionError> {
        self.link.send(payload)
    }

    #[must_use]
    pub fn status(&self) -> &Observable<ConnectionStatus> {
        &self.link.status
    }

    /// Last received message payload.
    #[must_use]
    pub fn data(&self) -> &Observable<Option<String>> {
        &self.link.data
    }

    /// Last transport error; cleared when the socket opens.
    #[must_use]
    pub fn error(&self) -> &Observable<Option<TransportError>> {
        &self.link.error
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.link.url()
    }

    /// Consecutive reconnect attempts since the last successful open.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.link.retry_count()
    }

    /// Total number of connect attempts, initial and reconnects.
    #[must_use]
    pub fn connect_attempts(&self) -> u64 {
        self.link.connect_attempts()
    }

    #[must_use]
    pub fn is_transport_live(&self) -> bool {
        self.link.is_transport_live()
    }

    #[must_use]
    pub fn is_reconnect_pending(&self) -> bool {
        self.link.is_reconnect_pending()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.link.close(None, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::options::{HeartbeatConfig, ReconnectPolicy};
    use crate::connection::testing::MockConnector;
    use crate::connection::transport::MessageEvent;
    use std::cell::RefCell;
    use tracing_test::traced_test;
    use web_time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn lifecycle_open_then_remote_close() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let socket = Socket::new("ws://a", net.clone(), &sched, SocketOptions::default());
        assert_eq!(socket.status().get(), ConnectionStatus::Connecting);

        net.simulate_open();
        assert_eq!(socket.status().get(), ConnectionStatus::Open);

        net.simulate_close(1001, "going away");
        assert_eq!(socket.status().get(), ConnectionStatus::Closed);
        assert!(!socket.is_transport_live());
        assert!(!socket.is_reconnect_pending());
    }

    #[test]
    fn not_immediate_waits_for_open() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default().immediate(false),
        );
        assert_eq!(net.attempts(), 0);
        assert_eq!(socket.status().get(), ConnectionStatus::Closed);

        socket.open();
        assert_eq!(net.attempts(), 1);
    }

    #[test]
    fn send_requires_open() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let socket = Socket::new("ws://a", net.clone(), &sched, SocketOptions::default());
        assert_eq!(
            socket.send("early"),
            Err(ConnectionError::NotOpen {
                status: ConnectionStatus::Connecting
            })
        );

        net.simulate_open();
        socket.send("now").unwrap();
        assert_eq!(net.sent(), vec!["now"]);
    }

    #[test]
    fn explicit_close_passes_through_closing() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new().hold_close();
        let statuses = Rc::new(RefCell::new(Vec::new()));
        let socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default().with_reconnect(true),
        );
        let s = Rc::clone(&statuses);
        let _sub = socket.status().subscribe(move |st| s.borrow_mut().push(*st));

        net.simulate_open();
        socket.close(Some(1000), Some("bye"));
        assert_eq!(socket.status().get(), ConnectionStatus::Closing);
        assert_eq!(
            net.closed_with(),
            Some((Some(1000), Some("bye".to_string())))
        );

        net.confirm_close();
        assert_eq!(socket.status().get(), ConnectionStatus::Closed);
        assert!(!socket.is_reconnect_pending());
        sched.advance(ms(5_000));
        assert_eq!(net.attempts(), 1);
        assert_eq!(
            *statuses.borrow(),
            vec![
                ConnectionStatus::Open,
                ConnectionStatus::Closing,
                ConnectionStatus::Closed
            ]
        );
    }

    #[test]
    fn close_while_connecting_discards_the_new_transport() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let socket = Rc::new(Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default()
                .immediate(false)
                .with_heartbeat(HeartbeatConfig::default().with_interval(ms(100))),
        ));
        let statuses = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&statuses);
        let weak = Rc::downgrade(&socket);
        let _sub = socket.status().subscribe(move |st| {
            s.borrow_mut().push(*st);
            if *st == ConnectionStatus::Connecting
                && let Some(socket) = weak.upgrade()
            {
                socket.close(None, None);
            }
        });

        socket.open();
        assert_eq!(socket.status().get(), ConnectionStatus::Closed);
        assert!(!socket.is_transport_live());
        assert_eq!(net.ready_state(), Some(ConnectionStatus::Closed));

        net.simulate_open();
        assert_eq!(socket.status().get(), ConnectionStatus::Closed);
        sched.advance(ms(500));
        assert!(net.sent().is_empty());
        assert_eq!(sched.pending(), 0);
        assert_eq!(
            *statuses.borrow(),
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Closing,
                ConnectionStatus::Closed
            ]
        );
    }

    #[test]
    fn late_open_after_close_is_ignored() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new().hold_close();
        let socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default()
                .with_heartbeat(HeartbeatConfig::default().with_interval(ms(100))),
        );
        socket.close(Some(1000), Some("bye"));
        assert_eq!(socket.status().get(), ConnectionStatus::Closing);

        // The transport reports open before it confirms the close.
        net.simulate_open();
        assert_eq!(socket.status().get(), ConnectionStatus::Closing);
        assert_eq!(net.ready_state(), Some(ConnectionStatus::Closing));
        assert_eq!(sched.pending(), 0);

        net.confirm_close();
        assert_eq!(socket.status().get(), ConnectionStatus::Closed);
        assert!(!socket.is_transport_live());
        sched.advance(ms(500));
        assert!(net.sent().is_empty());
        assert_eq!(net.attempts(), 1);
    }

    #[test]
    fn unintended_close_reconnects_after_delay() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default().with_reconnect(ReconnectPolicy::Limited {
                retries: 2,
                delay: ms(100),
            }),
        );
        net.simulate_open();
        net.simulate_close(1006, "");
        assert!(socket.is_reconnect_pending());
        assert_eq!(socket.retry_count(), 1);

        sched.advance(ms(99));
        assert_eq!(net.attempts(), 1);
        sched.advance(ms(1));
        assert_eq!(net.attempts(), 2);
        assert_eq!(socket.status().get(), ConnectionStatus::Connecting);
        // Reconnect attempts do not reset the counter; opening does.
        assert_eq!(socket.retry_count(), 1);
        net.simulate_open();
        assert_eq!(socket.retry_count(), 0);
    }

    #[test]
    #[traced_test]
    fn exhausted_retries_leave_socket_closed() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::always_failing();
        let socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default().with_reconnect(ReconnectPolicy::Limited {
                retries: 1,
                delay: ms(10),
            }),
        );
        sched.advance(ms(100));
        assert_eq!(net.attempts(), 2);
        assert_eq!(socket.status().get(), ConnectionStatus::Closed);
        assert!(!socket.is_reconnect_pending());
        assert!(logs_contain("reconnect attempts exhausted"));
    }

    #[test]
    fn explicit_open_resets_retries_and_cancels_pending_reconnect() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default().with_reconnect(true),
        );
        net.simulate_close(1006, "");
        assert_eq!(socket.retry_count(), 1);

        socket.open();
        assert_eq!(socket.retry_count(), 0);
        assert!(!socket.is_reconnect_pending());
        sched.advance(ms(2_000));
        assert_eq!(net.attempts(), 2);
    }

    #[test]
    fn reopen_disposes_previous_transport() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let socket = Socket::new("ws://a", net.clone(), &sched, SocketOptions::default());
        net.simulate_open();
        let stale = net.events(0).unwrap();

        socket.open();
        assert_eq!(net.closed_with_at(0), Some((None, None)));
        assert_eq!(socket.status().get(), ConnectionStatus::Connecting);

        // Late events from the old transport are ignored.
        stale.message(MessageEvent::text("late"));
        stale.opened();
        assert_eq!(socket.data().get(), None);
        assert_eq!(socket.status().get(), ConnectionStatus::Connecting);
        assert!(!stale.is_live());
    }

    #[test]
    fn messages_update_data_and_callback() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let received = Rc::new(RefCell::new(Vec::new()));
        let r = Rc::clone(&received);
        let socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default().on_message(move |m| r.borrow_mut().push(m.data.clone())),
        );
        net.simulate_open();
        net.simulate_message("a");
        net.simulate_message("a");
        assert_eq!(socket.data().get().as_deref(), Some("a"));
        assert_eq!(socket.data().version(), 2);
        assert_eq!(*received.borrow(), vec!["a", "a"]);
    }

    #[test]
    fn error_without_close_keeps_state() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let e = Rc::clone(&errors);
        let socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default().on_error(move |err| e.borrow_mut().push(err.clone())),
        );
        net.simulate_open();
        net.simulate_error(TransportError::Other("glitch".into()));

        assert_eq!(socket.status().get(), ConnectionStatus::Open);
        assert_eq!(errors.borrow().len(), 1);
        assert_eq!(
            socket.error().get(),
            Some(TransportError::Other("glitch".into()))
        );
    }

    #[test]
    fn error_on_closed_transport_closes() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let socket = Socket::new("ws://a", net.clone(), &sched, SocketOptions::default());
        net.simulate_open();
        net.simulate_fatal_error(TransportError::Other("reset".into()));
        assert_eq!(socket.status().get(), ConnectionStatus::Closed);
    }

    #[test]
    fn heartbeat_runs_only_while_open() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default()
                .with_reconnect(ReconnectPolicy::Limited {
                    retries: 1,
                    delay: ms(10),
                })
                .with_heartbeat(HeartbeatConfig::default().with_interval(ms(100))),
        );
        sched.advance(ms(250));
        assert!(net.sent().is_empty());

        net.simulate_open();
        sched.advance(ms(250));
        assert_eq!(net.sent(), vec!["ping", "ping"]);

        net.simulate_close(1006, "");
        sched.advance(ms(10));
        net.simulate_open();
        sched.advance(ms(100));
        // One interval per open transport, never duplicated.
        assert_eq!(net.sent_at(1), vec!["ping"]);
        assert_eq!(sched.pending(), 1);
        drop(socket);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn heartbeat_send_failure_is_swallowed() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default().with_heartbeat(HeartbeatConfig::default().with_interval(ms(50))),
        );
        net.simulate_open();
        net.fail_sends(true);
        sched.advance(ms(200));
        assert_eq!(socket.status().get(), ConnectionStatus::Open);
        assert!(net.sent().is_empty());
    }

    #[test]
    fn callbacks_fire_on_transitions() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2) = (Rc::clone(&log), Rc::clone(&log));
        let _socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default()
                .on_connected(move || l1.borrow_mut().push("connected".to_string()))
                .on_disconnected(move |ev| l2.borrow_mut().push(format!("closed {}", ev.code))),
        );
        net.simulate_open();
        net.simulate_close(4000, "kicked");
        assert_eq!(*log.borrow(), vec!["connected", "closed 4000"]);
    }

    #[test]
    fn protocols_reach_connector() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let _socket = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default().with_protocols(["chat"]),
        );
        let request = net.last_request().unwrap();
        assert_eq!(request.url, "ws://a");
        assert_eq!(request.protocols, vec!["chat"]);
    }

    #[test]
    fn callback_may_send_from_on_connected() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let socket: Rc<RefCell<Option<Socket>>> = Rc::new(RefCell::new(None));
        let handle = Rc::clone(&socket);
        let opened = Socket::new(
            "ws://a",
            net.clone(),
            &sched,
            SocketOptions::default().on_connected(move || {
                if let Some(s) = handle.borrow().as_ref() {
                    s.send("hello").unwrap();
                }
            }),
        );
        *socket.borrow_mut() = Some(opened);
        net.simulate_open();
        assert_eq!(net.sent(), vec!["hello"]);
        socket.borrow_mut().take();
    }
}
