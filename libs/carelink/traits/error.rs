use thiserror::Error;

/// Reasons an outbound send is rejected before reaching the transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The connection is not in the `Connected` state
    #[error("not connected")]
    NotConnected,

    /// No room is currently held
    #[error("not in a room")]
    NoRoom,

    /// The transport dropped the frame (link already closed)
    #[error("transport closed: {0}")]
    Closed(String),
}

/// Main error type for carelink
#[derive(Error, Debug, Clone)]
pub enum RealtimeError {
    /// Endpoint unreachable or provider misconfigured; never retried automatically
    #[error("Connect error: {0}")]
    Connect(String),

    /// Attempted send while not connected or not in a room
    #[error("Send error: {0}")]
    Send(#[from] SendError),

    /// Malformed inbound frame; the frame is dropped
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Adapter-level failure while connected
    #[error("Transport error: {0}")]
    Transport(String),

    /// Reconnection gave up; the manager is terminally disconnected
    #[error("Reconnection failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Operation not allowed in the current connection state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// In-flight operation cancelled by `disconnect()`
    #[error("Operation cancelled")]
    Cancelled,
}

impl RealtimeError {
    /// Whether the error leaves the manager in its terminal state
    pub fn is_fatal(&self) -> bool {
        matches!(self, RealtimeError::ReconnectExhausted { .. })
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::Protocol(e.to_string())
    }
}

/// Result type for carelink operations
pub type Result<T> = std::result::Result<T, RealtimeError>;
