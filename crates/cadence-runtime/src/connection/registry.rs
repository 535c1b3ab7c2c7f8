#![forbid(unsafe_code)]

//! Keyed registry of long-lived connections.
//!
//! A registry owns its channels. Replacing or removing an entry closes the
//! old channel before handing it back, so at most one live connection exists
//! per id.
//!
//! # Invariants
//!
//! - Iteration order is the lexical order of ids.
//! - [`close_all`](ChannelRegistry::close_all) leaves the registry empty.

use std::collections::BTreeMap;
use std::fmt;

use super::event_stream::EventStream;
use super::socket::Socket;
use super::status::ConnectionStatus;

/// A connection a [`ChannelRegistry`] can own.
pub trait Channel {
    /// Close without reconnecting.
    fn close(&self);
    fn status(&self) -> ConnectionStatus;
}

impl Channel for Socket {
    fn close(&self) {
        Socket::close(self, None, None);
    }

    fn status(&self) -> ConnectionStatus {
        Socket::status(self).get()
    }
}

impl Channel for EventStream {
    fn close(&self) {
        EventStream::close(self);
    }

    fn status(&self) -> ConnectionStatus {
        EventStream::status(self).get()
    }
}

/// Registry key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChannelId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connections keyed by [`ChannelId`].
pub struct ChannelRegistry<H: Channel> {
    channels: BTreeMap<ChannelId, H>,
}

impl<H: Channel> Default for ChannelRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Channel> fmt::Debug for ChannelRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.channels.iter().map(|(id, ch)| (id, ch.status())))
            .finish()
    }
}

impl<H: Channel> ChannelRegistry<H> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: BTreeMap::new(),
        }
    }

    /// Register `channel` under `id`. A channel already registered there is
    /// closed and returned.
    pub fn insert(&mut self, id: impl Into<ChannelId>, channel: H) -> Option<H> {
        let id = id.into();
        let old = self.channels.insert(id.clone(), channel);
        if let Some(old) = &old {
            tracing::debug!(channel = %id, "replacing registered channel");
            old.close();
        }
        old
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&H> {
        self.channels.get(&ChannelId::from(id))
    }

    /// The channel under `id`, creating it with `make` if absent.
    pub fn get_or_insert_with(&mut self, id: impl Into<ChannelId>, make: impl FnOnce() -> H) -> &H {
        self.channels.entry(id.into()).or_insert_with(make)
    }

    /// Unregister and close the channel under `id`.
    pub fn remove(&mut self, id: &str) -> Option<H> {
        let old = self.channels.remove(&ChannelId::from(id))?;
        old.close();
        Some(old)
    }

    /// Close every channel and empty the registry.
    pub fn close_all(&mut self) {
        for (id, channel) in std::mem::take(&mut self.channels) {
            tracing::trace!(channel = %id, "closing channel");
            channel.close();
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &ChannelId> {
        self.channels.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::options::{EventStreamOptions, SocketOptions};
    use crate::connection::testing::MockConnector;
    use cadence_core::Scheduler;

    #[test]
    fn insert_replaces_and_closes() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let mut reg = ChannelRegistry::new();
        reg.insert("chat", Socket::new("wss://a", net.clone(), &sched, SocketOptions::default()));
        net.simulate_open();

        let old = reg
            .insert("chat", Socket::new("wss://b", net.clone(), &sched, SocketOptions::default()))
            .unwrap();
        assert_eq!(Channel::status(&old), ConnectionStatus::Closed);
        assert_eq!(reg.get("chat").unwrap().url(), "wss://b");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn get_or_insert_with_creates_once() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let mut reg = ChannelRegistry::new();
        for _ in 0..3 {
            reg.get_or_insert_with("feed", || {
                EventStream::new("https://a/sse", net.clone(), &sched, EventStreamOptions::default())
            });
        }
        assert_eq!(net.attempts(), 1);
    }

    #[test]
    fn remove_and_close_all() {
        let (sched, _lab) = Scheduler::lab();
        let net = MockConnector::new();
        let mut reg = ChannelRegistry::new();
        for id in ["b", "a", "c"] {
            reg.insert(id, EventStream::new("https://x", net.clone(), &sched, EventStreamOptions::default()));
        }
        let ids: Vec<&str> = reg.ids().map(ChannelId::as_str).collect();
        assert_eq!(ids, ["a", "b", "c"]);

        let removed = reg.remove("b").unwrap();
        assert_eq!(Channel::status(&removed), ConnectionStatus::Closed);
        assert!(reg.remove("b").is_none());

        reg.close_all();
        assert!(reg.is_empty());
    }
}
