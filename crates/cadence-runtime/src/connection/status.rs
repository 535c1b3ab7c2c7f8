#![forbid(unsafe_code)]

use std::fmt;

/// Lifecycle state of a connection or transport.
///
/// Push-only streams never report `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum ConnectionStatus {
    /// A transport exists but has not reported open yet.
    Connecting,
    /// The transport is open.
    Open,
    /// A close was requested and is awaiting confirmation.
    Closing,
    /// No live transport.
    #[default]
    Closed,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Upper-case name, matching the browser ready-state names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_closed() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Closed);
        assert!(ConnectionStatus::default().is_closed());
    }

    #[test]
    fn display_uses_ready_state_names() {
        assert_eq!(ConnectionStatus::Connecting.to_string(), "CONNECTING");
        assert_eq!(ConnectionStatus::Closing.to_string(), "CLOSING");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_uses_upper_case() {
        let json = serde_json::to_string(&ConnectionStatus::Open).unwrap();
        assert_eq!(json, "\"OPEN\"");
        let back: ConnectionStatus = serde_json::from_str("\"CLOSED\"").unwrap();
        assert_eq!(back, ConnectionStatus::Closed);
    }
}
