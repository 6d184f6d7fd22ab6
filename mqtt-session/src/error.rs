//! Error types for the mqtt-session crate.

use std::time::Duration;

/// Errors that end (or prevent) a broker session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The broker refused the connection with the "not authorized" reason code (0x87)
    #[error("Connection refused: not authorized")]
    NotAuthorized,

    /// The broker refused the connection for any other reason
    #[error("Connection refused: {0}")]
    Refused(String),

    /// A topic filter subscription was rejected or could not be sent
    #[error("Subscription to {topic} failed: {reason}")]
    Subscribe {
        /// The topic filter that failed
        topic: String,
        /// Broker reason code or client error
        reason: String,
    },

    /// Network, TLS, WebSocket or protocol state failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// The connect/subscribe handshake did not complete in time
    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The broker or the client closed the session
    #[error("Session closed")]
    Closed,
}

impl SessionError {
    /// Whether the broker rejected the presented credential.
    pub fn is_not_authorized(&self) -> bool {
        matches!(self, SessionError::NotAuthorized)
    }
}

/// Convenience type alias for Results using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;
