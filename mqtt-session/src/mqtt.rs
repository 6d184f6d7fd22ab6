//! `rumqttc` backed connector: MQTT v5 over WSS with rustls.

use std::collections::VecDeque;

use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet, Publish};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, StateError,
};
use rumqttc::{Outgoing, Transport};
use tracing::{debug, trace};

use crate::error::{Result, SessionError};
use crate::message::RawMessage;
use crate::session::{Connector, Session};
use crate::settings::{SessionSettings, SessionTransport};

/// Opens MQTT v5 sessions over secure WebSockets.
///
/// A fresh client and event loop are built for every connect; reusing them
/// across reconnects would carry over stale protocol state.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    settings: SessionSettings,
}

impl MqttConnector {
    /// Create a connector from session settings.
    pub fn new(settings: SessionSettings) -> Self {
        Self { settings }
    }

    /// The settings used for every session.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(
            self.settings.client_id.clone(),
            self.settings.broker_url.clone(),
            self.settings.port,
        );
        options
            .set_credentials(self.settings.username.clone(), self.settings.password.clone())
            .set_keep_alive(self.settings.keep_alive)
            .set_clean_start(true);
        if self.settings.transport == SessionTransport::WebSocketSecure {
            options.set_transport(Transport::wss_with_default_config());
        }
        options
    }
}

#[async_trait]
impl Connector for MqttConnector {
    async fn connect(&self, topics: &[&str]) -> Result<Box<dyn Session>> {
        debug!(
            "Connecting to {} as {}",
            self.settings.broker_url, self.settings.client_id
        );

        let (client, eventloop) = AsyncClient::new(self.options(), self.settings.request_capacity);
        let mut session = MqttSession {
            client,
            eventloop,
            pending: VecDeque::new(),
            close_timeout: self.settings.close_timeout,
            finished: false,
        };

        let limit = self.settings.connect_timeout;
        match tokio::time::timeout(limit, session.handshake(topics)).await {
            Ok(Ok(())) => Ok(Box::new(session)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(SessionError::Timeout(limit)),
        }
    }
}

/// A live MQTT session. Owns the client and its event loop; dropping it drops
/// the socket.
pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    /// Publishes that arrived while subscriptions were still being acknowledged
    pending: VecDeque<RawMessage>,
    close_timeout: std::time::Duration,
    /// Set once the connection is gone or closed. Polling the event loop
    /// after that would open a new connection.
    finished: bool,
}

impl MqttSession {
    async fn handshake(&mut self, topics: &[&str]) -> Result<()> {
        loop {
            if let Event::Incoming(Packet::ConnAck(ack)) = self.eventloop.poll().await.map_err(classify)? {
                if !matches!(ack.code, ConnectReturnCode::Success) {
                    return Err(refusal(ack.code));
                }
                break;
            }
        }

        // The request channel may be smaller than the topic list; when it is
        // full the event loop is polled to drain it.
        let mut requested = 0;
        let mut acknowledged = 0;
        while acknowledged < topics.len() {
            if requested < topics.len() {
                let topic = topics[requested];
                match self.client.try_subscribe(topic, QoS::AtMostOnce) {
                    Ok(()) => {
                        requested += 1;
                        continue;
                    }
                    Err(ClientError::TryRequest(_)) => trace!("Request channel full, polling"),
                    Err(e) => {
                        return Err(SessionError::Subscribe {
                            topic: topic.to_string(),
                            reason: e.to_string(),
                        })
                    }
                }
            }

            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    debug!("Subscribed to {}", topics[acknowledged]);
                    acknowledged += 1;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.pending.push_back(raw_message(publish));
                }
                Ok(_) => {}
                Err(ConnectionError::MqttState(StateError::SubFail { reason })) => {
                    return Err(SessionError::Subscribe {
                        topic: topics[acknowledged].to_string(),
                        reason: format!("{reason:?}"),
                    });
                }
                Err(e) => return Err(classify(e)),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Session for MqttSession {
    async fn next_message(&mut self) -> Result<Option<RawMessage>> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(Some(message));
        }
        if self.finished {
            return Ok(None);
        }

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(Some(raw_message(publish)));
                }
                Ok(event) => trace!("MQTT event: {:?}", event),
                Err(ConnectionError::MqttState(
                    disconnect @ StateError::ServerDisconnect { .. },
                )) => {
                    debug!("Broker ended the session: {}", disconnect);
                    self.finished = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.finished = true;
                    return Err(classify(e));
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        let client = &self.client;
        let eventloop = &mut self.eventloop;
        let flushed = tokio::time::timeout(self.close_timeout, async {
            // A full request channel is drained by polling until DISCONNECT fits
            loop {
                match client.try_disconnect() {
                    Ok(()) => break,
                    Err(ClientError::TryRequest(_)) => {
                        if eventloop.poll().await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        debug!("Could not queue DISCONNECT: {}", e);
                        return;
                    }
                }
            }
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;

        if flushed.is_err() {
            debug!("DISCONNECT not flushed within {:?}", self.close_timeout);
        }
    }
}

/// Map a `rumqttc` connection error into the session error taxonomy.
pub fn classify(error: ConnectionError) -> SessionError {
    match error {
        ConnectionError::ConnectionRefused(code) => refusal(code),
        ConnectionError::RequestsDone => SessionError::Closed,
        ConnectionError::MqttState(StateError::ServerDisconnect { .. }) => SessionError::Closed,
        ConnectionError::MqttState(StateError::SubFail { reason }) => SessionError::Subscribe {
            topic: String::new(),
            reason: format!("{reason:?}"),
        },
        other => SessionError::Connection(other.to_string()),
    }
}

fn refusal(code: ConnectReturnCode) -> SessionError {
    match code {
        ConnectReturnCode::NotAuthorized => SessionError::NotAuthorized,
        other => SessionError::Refused(format!("{other:?}")),
    }
}

fn raw_message(publish: Publish) -> RawMessage {
    RawMessage {
        topic: String::from_utf8_lossy(&publish.topic).into_owned(),
        payload: publish.payload,
    }
}
