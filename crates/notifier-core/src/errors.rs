use std::time::Duration;

/// Rejected session handle text.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("session handle must not be empty")]
    Empty,
}

/// Failure resolving a session handle against the session table.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionLookupError {
    #[error("invalid session handle: {0}")]
    InvalidHandle(String),
}

/// Failure returned by the cluster manager when asked to end a session.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClusterManagerError {
    #[error("cluster manager unavailable: {0}")]
    Unavailable(String),
}

/// Typed error hierarchy for delivering a call to a session driver.
/// Every variant is a failed attempt from the context's point of view; the
/// classification only feeds logging and metrics.
#[derive(Clone, Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("io error: {0}")]
    Io(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("driver rejected call ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// A rejection is an answer from a live driver; everything else means the
    /// driver could not be reached.
    pub fn is_unreachable(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Timeout(_) => "timeout",
            Self::Io(_) => "io",
            Self::Protocol(_) => "protocol",
            Self::Rejected { .. } => "rejected",
            Self::Closed => "closed",
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Protocol(e.to_string())
    }
}

/// Failure loading settings from disk.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}
