//! Connector and session traits.
//!
//! These are the seams between the transport and everything above it. The
//! production implementation is [`crate::MqttConnector`]; tests substitute
//! scripted implementations.

use async_trait::async_trait;

use crate::error::SessionError;
use crate::message::RawMessage;

/// Opens broker sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open one authenticated session and subscribe to every topic filter in
    /// order before returning.
    ///
    /// A failed subscription is a failed connect. No message is yielded by the
    /// returned session before all subscriptions were acknowledged.
    async fn connect(&self, topics: &[&str]) -> Result<Box<dyn Session>, SessionError>;
}

/// A live broker session holding exactly one network connection.
///
/// Dropping a session releases the connection. [`Session::close`] does so
/// gracefully.
#[async_trait]
pub trait Session: Send {
    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` once the broker has ended the session.
    async fn next_message(&mut self) -> Result<Option<RawMessage>, SessionError>;

    /// Disconnect from the broker.
    async fn close(&mut self);
}
