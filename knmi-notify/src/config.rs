//! Configuration for the notification service.
//!
//! The broker endpoint, the username sentinel and the topic filters are fixed;
//! only timing behaviour is configurable.

use std::time::Duration;

use mqtt_session::SessionSettings;

use crate::backoff::RetryPolicy;
use crate::dataset::SessionIdentity;
use crate::error::ConfigError;

/// WebSocket endpoint of the KNMI notification broker.
pub const BROKER_URL: &str = "wss://mqtt.dataplatform.knmi.nl:443/mqtt";

/// Broker port.
pub const BROKER_PORT: u16 = 443;

/// Username presented with the bearer token.
pub const BROKER_USERNAME: &str = "token";

/// Configuration for the [`crate::NotificationService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Delay policy between reconnect attempts
    /// Default: exponential, 30 seconds doubling up to 15 minutes
    pub retry: RetryPolicy,

    /// MQTT keep-alive interval
    /// Default: 60 seconds
    pub keep_alive: Duration,

    /// Timeout for the connect and subscribe handshake
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Timeout for a whole credential validation attempt
    /// Default: 30 seconds
    pub validation_timeout: Duration,

    /// Time `stop()` waits for the stream task before aborting it
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,

    /// Time allowed to flush DISCONNECT when closing a session
    /// Default: 2 seconds
    pub close_timeout: Duration,

    /// Capacity of the MQTT client request channel
    /// Default: 32
    pub request_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            validation_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(2),
            request_capacity: 32,
        }
    }
}

impl NotificationConfig {
    /// Create a NotificationConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a NotificationConfig that waits the same delay after every failure
    pub fn fixed_delay(delay: Duration) -> Self {
        Self {
            retry: RetryPolicy::fixed(delay),
            ..Default::default()
        }
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry.validate()?;

        if self.keep_alive < Duration::from_secs(1) {
            return Err(ConfigError::Invalid(
                "Keep-alive must be at least 1 second".to_string(),
            ));
        }

        for (name, value) in [
            ("Connect timeout", self.connect_timeout),
            ("Validation timeout", self.validation_timeout),
            ("Shutdown timeout", self.shutdown_timeout),
            ("Close timeout", self.close_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }

        if self.request_capacity == 0 {
            return Err(ConfigError::Invalid(
                "Request capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Session settings for the KNMI broker with the given token.
    pub fn session_settings(&self, token: &str) -> SessionSettings {
        SessionSettings::new(
            BROKER_URL,
            BROKER_PORT,
            SessionIdentity::process().as_str(),
            BROKER_USERNAME,
            token,
        )
        .with_keep_alive(self.keep_alive)
        .with_connect_timeout(self.connect_timeout)
        .with_close_timeout(self.close_timeout)
        .with_request_capacity(self.request_capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = NotificationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_delay_preset() {
        let config = NotificationConfig::fixed_delay(Duration::from_secs(30));
        assert_eq!(config.retry, RetryPolicy::fixed(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let config = NotificationConfig {
            connect_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Invalid("Connect timeout must be greater than 0".to_string()))
        );

        let config = NotificationConfig {
            request_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = NotificationConfig::default().with_retry(RetryPolicy::fixed(Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_session_settings() {
        let settings = NotificationConfig::default().session_settings("abc");
        assert_eq!(settings.broker_url, BROKER_URL);
        assert_eq!(settings.port, 443);
        assert_eq!(settings.username, "token");
        assert_eq!(settings.password, "abc");
        assert_eq!(settings.client_id, SessionIdentity::process().as_str());
    }
}
