//! The long-lived connect, stream and reconnect loop.
//!
//! The loop owns at most one session at a time. Every exit from the streaming
//! state closes and drops the session before the next connect is attempted,
//! and a shutdown request is honoured in every state.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use mqtt_session::{Connector, Session, SessionError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::backoff::{Backoff, RetryPolicy};
use crate::dataset::TOPIC_FILTERS;
use crate::dispatcher::{panic_message, Dispatcher};
use crate::event::decode;

/// Observable state of the notification stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting `delay` before connect attempt number `attempt` since the last
    /// successful connection
    Reconnecting { attempt: u32, delay: Duration },
    /// Subscribed and streaming
    Connected,
    /// Not running
    Stopped,
}

/// Why a session was abandoned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoopFailure {
    /// The transport failed to connect, subscribe or read
    #[error("MQTT session failed: {0}")]
    Session(#[from] SessionError),

    /// The broker closed the session
    #[error("MQTT session ended by broker")]
    StreamEnded,

    /// A panic escaped the read loop
    #[error("unexpected error in notification stream: {0}")]
    Unexpected(String),
}

impl LoopFailure {
    /// Whether the failure will most likely repeat on the next attempt.
    pub fn is_likely_permanent(&self) -> bool {
        matches!(self, LoopFailure::Session(e) if e.is_not_authorized())
    }
}

/// Keeps the notification stream alive until told to stop.
pub struct ResilienceLoop {
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    backoff: Backoff,
    shutdown_rx: mpsc::Receiver<()>,
    state: Arc<watch::Sender<ConnectionState>>,
}

impl ResilienceLoop {
    /// Create a loop. It does nothing until [`ResilienceLoop::run`] is awaited.
    ///
    /// The loop stops when `shutdown_rx` yields or its sender is dropped.
    pub fn new(
        connector: Arc<dyn Connector>,
        dispatcher: Dispatcher,
        retry: RetryPolicy,
        shutdown_rx: mpsc::Receiver<()>,
        state: Arc<watch::Sender<ConnectionState>>,
    ) -> Self {
        Self {
            connector,
            dispatcher,
            backoff: Backoff::new(retry),
            shutdown_rx,
            state,
        }
    }

    /// Run until shutdown.
    pub async fn run(self) {
        let ResilienceLoop {
            connector,
            dispatcher,
            mut backoff,
            mut shutdown_rx,
            state,
        } = self;

        info!("Starting KNMI notification stream");

        let mut attempt: u32 = 1;
        let mut delay = Duration::ZERO;

        loop {
            state.send_replace(ConnectionState::Reconnecting { attempt, delay });

            let connecting = async {
                tokio::time::sleep(delay).await;
                connector.connect(&TOPIC_FILTERS).await
            };

            let connected = tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = AssertUnwindSafe(connecting).catch_unwind() => match result {
                    Ok(result) => result.map_err(LoopFailure::Session),
                    Err(payload) => Err(LoopFailure::Unexpected(panic_message(payload))),
                },
            };

            let mut session = match connected {
                Ok(session) => session,
                Err(failure) => {
                    delay = backoff.next_delay(failure.is_likely_permanent());
                    attempt = attempt.saturating_add(1);
                    report(&failure, delay);
                    continue;
                }
            };

            info!("Connected to KNMI notification broker");
            backoff.reset();
            attempt = 1;
            state.send_replace(ConnectionState::Connected);

            let outcome = tokio::select! {
                _ = shutdown_rx.recv() => None,
                streamed = AssertUnwindSafe(stream(session.as_mut(), &dispatcher)).catch_unwind() => {
                    Some(streamed.unwrap_or_else(|payload| LoopFailure::Unexpected(panic_message(payload))))
                }
            };

            session.close().await;
            drop(session);

            let Some(failure) = outcome else {
                break;
            };

            delay = backoff.next_delay(failure.is_likely_permanent());
            report(&failure, delay);
        }

        state.send_replace(ConnectionState::Stopped);
        info!("KNMI notification stream stopped");
    }
}

impl std::fmt::Debug for ResilienceLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceLoop")
            .field("dispatcher", &self.dispatcher)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Read, decode and dispatch messages one at a time until the session fails.
async fn stream(session: &mut dyn Session, dispatcher: &Dispatcher) -> LoopFailure {
    loop {
        match session.next_message().await {
            Ok(Some(message)) => {
                if let Some(event) = decode(&message) {
                    dispatcher.dispatch(event).await;
                }
            }
            Ok(None) => return LoopFailure::StreamEnded,
            Err(e) => return LoopFailure::Session(e),
        }
    }
}

fn report(failure: &LoopFailure, delay: Duration) {
    match failure {
        LoopFailure::Session(e) if e.is_not_authorized() => {
            warn!("MQTT broker rejected the token, retrying in {:?}", delay);
        }
        LoopFailure::Unexpected(message) => {
            error!(
                "Unexpected error in KNMI notification stream, reconnecting in {:?}: {}",
                delay, message
            );
        }
        other => debug!("{}, reconnecting in {:?}", other, delay),
    }
}
