#![forbid(unsafe_code)]

//! Connection configuration.

use std::fmt;

use web_time::Duration;

use super::error::TransportError;
use super::transport::{CloseEvent, MessageEvent};

/// Retry budget used by [`ReconnectPolicy::limited_default`].
pub const DEFAULT_RETRIES: u32 = 3;
/// Delay used by `ReconnectPolicy::from(true)` and
/// [`ReconnectPolicy::limited_default`].
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1_000);
/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Default heartbeat payload.
pub const DEFAULT_HEARTBEAT_MESSAGE: &str = "ping";

/// What to do after an unintended close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "mode", rename_all = "snake_case"))]
pub enum ReconnectPolicy {
    /// Stay closed.
    #[default]
    Disabled,
    /// Reconnect after `delay`, forever.
    Unlimited { delay: Duration },
    /// Reconnect after `delay`, at most `retries` times in a row.
    Limited { retries: u32, delay: Duration },
}

impl ReconnectPolicy {
    /// [`DEFAULT_RETRIES`] attempts, [`DEFAULT_RECONNECT_DELAY`] apart.
    #[must_use]
    pub const fn limited_default() -> Self {
        Self::Limited {
            retries: DEFAULT_RETRIES,
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Delay before a reconnect attempt, if reconnecting at all.
    #[must_use]
    pub const fn delay(self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::Unlimited { delay } | Self::Limited { delay, .. } => Some(delay),
        }
    }

    /// Whether another attempt is allowed after `retries` consecutive ones.
    #[must_use]
    pub const fn allows(self, retries: u32) -> bool {
        match self {
            Self::Disabled => false,
            Self::Unlimited { .. } => true,
            Self::Limited { retries: max, .. } => retries < max,
        }
    }
}

impl From<bool> for ReconnectPolicy {
    fn from(enabled: bool) -> Self {
        if enabled {
            Self::Unlimited {
                delay: DEFAULT_RECONNECT_DELAY,
            }
        } else {
            Self::Disabled
        }
    }
}

/// Keep-alive sent while a socket is open.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub message: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_HEARTBEAT_INTERVAL,
            message: DEFAULT_HEARTBEAT_MESSAGE.to_string(),
        }
    }
}

impl HeartbeatConfig {
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

// ─── Callbacks ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct Callbacks {
    pub(crate) on_connected: Option<Box<dyn FnMut()>>,
    pub(crate) on_disconnected: Option<Box<dyn FnMut(&CloseEvent)>>,
    pub(crate) on_error: Option<Box<dyn FnMut(&TransportError)>>,
    pub(crate) on_message: Option<Box<dyn FnMut(&MessageEvent)>>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_connected", &self.on_connected.is_some())
            .field("on_disconnected", &self.on_disconnected.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}

// ─── SocketOptions ───────────────────────────────────────────────────────────

/// Options for [`Socket::new`](super::Socket::new).
#[derive(Debug)]
pub struct SocketOptions {
    /// Connect at construction. Defaults to `true`.
    pub immediate: bool,
    pub reconnect: ReconnectPolicy,
    pub heartbeat: Option<HeartbeatConfig>,
    pub protocols: Vec<String>,
    pub(crate) callbacks: Callbacks,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            immediate: true,
            reconnect: ReconnectPolicy::Disabled,
            heartbeat: None,
            protocols: Vec::new(),
            callbacks: Callbacks::default(),
        }
    }
}

impl SocketOptions {
    #[must_use]
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Accepts a [`ReconnectPolicy`] or a `bool`.
    #[must_use]
    pub fn with_reconnect(mut self, policy: impl Into<ReconnectPolicy>) -> Self {
        self.reconnect = policy.into();
        self
    }

    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = Some(heartbeat);
        self
    }

    #[must_use]
    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Called on every transition to `Open`.
    #[must_use]
    pub fn on_connected(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.on_connected = Some(Box::new(f));
        self
    }

    /// Called on every transition to `Closed` caused by the transport.
    #[must_use]
    pub fn on_disconnected(mut self, f: impl FnMut(&CloseEvent) + 'static) -> Self {
        self.callbacks.on_disconnected = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(&TransportError) + 'static) -> Self {
        self.callbacks.on_error = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_message(mut self, f: impl FnMut(&MessageEvent) + 'static) -> Self {
        self.callbacks.on_message = Some(Box::new(f));
        self
    }
}

// ─── EventStreamOptions ──────────────────────────────────────────────────────

/// Options for [`EventStream::new`](super::EventStream::new).
#[derive(Debug)]
pub struct EventStreamOptions {
    /// Connect at construction. Defaults to `true`.
    pub immediate: bool,
    pub reconnect: ReconnectPolicy,
    pub with_credentials: bool,
    /// Named events to listen for besides `"message"`.
    pub events: Vec<String>,
    pub(crate) callbacks: Callbacks,
}

impl Default for EventStreamOptions {
    fn default() -> Self {
        Self {
            immediate: true,
            reconnect: ReconnectPolicy::Disabled,
            with_credentials: false,
            events: Vec::new(),
            callbacks: Callbacks::default(),
        }
    }
}

impl EventStreamOptions {
    #[must_use]
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Accepts a [`ReconnectPolicy`] or a `bool`.
    #[must_use]
    pub fn with_reconnect(mut self, policy: impl Into<ReconnectPolicy>) -> Self {
        self.reconnect = policy.into();
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    #[must_use]
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    /// Called on every transition to `Open`.
    #[must_use]
    pub fn on_connected(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.on_connected = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(&TransportError) + 'static) -> Self {
        self.callbacks.on_error = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_message(mut self, f: impl FnMut(&MessageEvent) + 'static) -> Self {
        self.callbacks.on_message = Some(Box::new(f));
        self
    }
}
