//! Connection settings for a broker session.

use std::fmt;
use std::time::Duration;

/// Network transport carrying the MQTT packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionTransport {
    /// WebSocket over TLS; `broker_url` is a `wss://` URL
    #[default]
    WebSocketSecure,
    /// Plain TCP; `broker_url` is a host name or address
    Tcp,
}

/// Everything needed to open one broker session.
#[derive(Clone)]
pub struct SessionSettings {
    /// WebSocket URL of the broker, e.g. `wss://host:443/mqtt`
    pub broker_url: String,
    /// Broker port
    pub port: u16,
    /// MQTT client identifier
    pub client_id: String,
    /// MQTT username
    pub username: String,
    /// MQTT password (bearer credential)
    pub password: String,
    /// Keep-alive interval
    /// Default: 60 seconds
    pub keep_alive: Duration,
    /// Upper bound for the connect and subscribe handshake
    /// Default: 30 seconds
    pub connect_timeout: Duration,
    /// Upper bound for flushing DISCONNECT on close
    /// Default: 2 seconds
    pub close_timeout: Duration,
    /// Capacity of the client request channel
    /// Default: 32
    pub request_capacity: usize,
    /// Default: WebSocket over TLS
    pub transport: SessionTransport,
}

impl SessionSettings {
    /// Create settings with default timeouts.
    pub fn new(
        broker_url: impl Into<String>,
        port: u16,
        client_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            broker_url: broker_url.into(),
            port,
            client_id: client_id.into(),
            username: username.into(),
            password: password.into(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(2),
            request_capacity: 32,
            transport: SessionTransport::default(),
        }
    }

    /// Set the keep-alive interval.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set the handshake timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the close timeout.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the request channel capacity.
    pub fn with_request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity;
        self
    }

    /// Set the network transport.
    pub fn with_transport(mut self, transport: SessionTransport) -> Self {
        self.transport = transport;
        self
    }
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("broker_url", &self.broker_url)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .field("close_timeout", &self.close_timeout)
            .field("request_capacity", &self.request_capacity)
            .field("transport", &self.transport)
            .finish()
    }
}
