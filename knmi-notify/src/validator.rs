//! One-shot credential check.

use std::time::Duration;

use mqtt_session::{Connector, MqttConnector, SessionError};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::NotificationConfig;
use crate::dataset::TOPIC_FILTERS;
use crate::error::CredentialError;

/// Check a token by opening a session and subscribing to a single topic.
///
/// Returns `Ok(true)` if the session was established, `Err(CredentialError::Invalid)`
/// if the broker answered "not authorized", and `Ok(false)` for every other
/// failure, including the attempt not completing within `limit`.
pub async fn validate_with(connector: &dyn Connector, limit: Duration) -> Result<bool, CredentialError> {
    let attempt = async {
        let mut session = connector.connect(&TOPIC_FILTERS[..1]).await?;
        session.close().await;
        Ok::<(), SessionError>(())
    };

    match timeout(limit, attempt).await {
        Ok(Ok(())) => {
            debug!("MQTT token accepted by broker");
            Ok(true)
        }
        Ok(Err(SessionError::NotAuthorized)) => {
            warn!("MQTT token rejected by broker");
            Err(CredentialError::Invalid)
        }
        Ok(Err(e)) => {
            warn!("Could not validate MQTT token: {}", e);
            Ok(false)
        }
        Err(_) => {
            warn!("Could not validate MQTT token: no answer within {:?}", limit);
            Ok(false)
        }
    }
}

/// Check a token against the KNMI broker.
///
/// Uses a client identifier distinct from the stream's so a running stream is
/// not taken over.
pub async fn validate(token: &str, config: &NotificationConfig) -> Result<bool, CredentialError> {
    let mut settings = config.session_settings(token);
    settings.client_id = format!("{}-validate", settings.client_id);

    let connector = MqttConnector::new(settings);
    validate_with(&connector, config.validation_timeout).await
}
