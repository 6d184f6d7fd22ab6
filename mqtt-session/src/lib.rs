//! Generic MQTT v5 session transport over secure WebSockets.
//!
//! This crate owns the physical broker connection and nothing else. It has no
//! knowledge of datasets, event payload formats or retry policy; those live in
//! the consuming crate.
//!
//! # Overview
//!
//! - [`Connector`]: opens one authenticated session and subscribes to a list of
//!   topic filters before handing the session back.
//! - [`Session`]: yields [`RawMessage`]s until the broker disconnects or the
//!   connection fails, and can be closed deterministically.
//! - [`MqttConnector`]: the `rumqttc` backed implementation used in production.
//! - [`SessionError`]: classification of connection failures, including the
//!   distinguished "not authorized" CONNACK status.
//!
//! # Example
//!
//! ```no_run
//! use mqtt_session::{Connector, MqttConnector, SessionSettings};
//!
//! # async fn example() -> Result<(), mqtt_session::SessionError> {
//! let settings = SessionSettings::new(
//!     "wss://broker.example.org:443/mqtt",
//!     443,
//!     "client-1234",
//!     "token",
//!     "my-bearer-token",
//! );
//! let connector = MqttConnector::new(settings);
//!
//! let mut session = connector.connect(&["sensors/#"]).await?;
//! while let Some(message) = session.next_message().await? {
//!     println!("{}: {} bytes", message.topic, message.payload.len());
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Private Workspace Crate
//!
//! This crate is intended for internal use within the workspace and is not
//! published to crates.io.

mod error;
mod message;
mod mqtt;
mod session;
mod settings;

pub use error::{Result, SessionError};
pub use message::RawMessage;
pub use mqtt::{classify, MqttConnector, MqttSession};
pub use session::{Connector, Session};
pub use settings::{SessionSettings, SessionTransport};
