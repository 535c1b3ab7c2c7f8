#![forbid(unsafe_code)]

use super::status::ConnectionStatus;

/// Failures reported by a [`Transport`](super::Transport) or
/// [`Connector`](super::Connector).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connector could not establish a transport.
    #[error("connect failed: {0}")]
    Connect(String),
    /// A payload could not be written.
    #[error("send failed: {0}")]
    Send(String),
    /// Any other error surfaced by the transport.
    #[error("transport error: {0}")]
    Other(String),
}

/// Failures of connection operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// `send` was called while the connection was not open.
    #[error("connection is not open (status {status})")]
    NotOpen { status: ConnectionStatus },
    /// The transport rejected the operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
