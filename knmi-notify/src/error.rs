//! Error types for the knmi-notify crate.

/// Errors from the notification service lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// `start()` was called while the stream task is running
    #[error("Notification service is already running")]
    AlreadyRunning,

    /// `start()` was called outside a tokio runtime
    #[error("Notification service must be started from within a tokio runtime")]
    NoRuntime,

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The stream task did not stop cleanly
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

/// Errors from configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A setting has an unusable value
    #[error("{0}")]
    Invalid(String),

    /// No bearer token was provided
    #[error("MQTT token must not be empty")]
    MissingToken,
}

/// Outcome of credential validation that the caller can act on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The broker rejected the token as not authorized
    #[error("The MQTT token was rejected by the broker")]
    Invalid,
}

/// Convenience type alias for Results using NotifyError.
pub type Result<T> = std::result::Result<T, NotifyError>;
