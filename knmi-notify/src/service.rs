//! Lifecycle interface of the notification stream.

use std::sync::Arc;
use std::time::Duration;

use mqtt_session::{Connector, MqttConnector};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::NotificationConfig;
use crate::dataset::DatasetName;
use crate::dispatcher::Dispatcher;
use crate::error::{ConfigError, NotifyError, Result};
use crate::registry::{ConsumerId, DatasetRegistry, EventConsumer};
use crate::resilience::{ConnectionState, ResilienceLoop};

struct Worker {
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

/// Owns the consumer registry and the background stream task.
///
/// Consumers can be registered and removed at any time, whether or not the
/// stream is running. Dropping the service aborts a running stream task.
///
/// # Example
///
/// ```no_run
/// use knmi_notify::{consumer_fn, KnownDataset, NotificationConfig, NotificationService};
///
/// # async fn example() -> knmi_notify::Result<()> {
/// let service = NotificationService::new("my-bearer-token", NotificationConfig::default())?;
///
/// service.set_callback(
///     KnownDataset::RadarForecast,
///     "radar-map",
///     consumer_fn(|event| async move {
///         println!("new radar forecast: {:?}", event.data.filename());
///         Ok(())
///     }),
/// );
///
/// service.start()?;
/// // ...
/// service.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct NotificationService {
    connector: Arc<dyn Connector>,
    config: NotificationConfig,
    registry: Arc<DatasetRegistry>,
    state: Arc<watch::Sender<ConnectionState>>,
    worker: Mutex<Option<Worker>>,
}

impl NotificationService {
    /// Create a service that connects to the KNMI broker with the given token.
    pub fn new(token: impl AsRef<str>, config: NotificationConfig) -> Result<Self> {
        let token = token.as_ref();
        if token.is_empty() {
            return Err(ConfigError::MissingToken.into());
        }
        config.validate()?;

        let connector = MqttConnector::new(config.session_settings(token));
        Ok(Self::build(Arc::new(connector), config))
    }

    /// Create a service on top of any connector.
    pub fn with_connector(connector: Arc<dyn Connector>, config: NotificationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(connector, config))
    }

    fn build(connector: Arc<dyn Connector>, config: NotificationConfig) -> Self {
        Self {
            connector,
            config,
            registry: Arc::new(DatasetRegistry::new()),
            state: Arc::new(watch::Sender::new(ConnectionState::Stopped)),
            worker: Mutex::new(None),
        }
    }

    /// The consumer registry.
    pub fn registry(&self) -> &Arc<DatasetRegistry> {
        &self.registry
    }

    /// The active configuration.
    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Register a consumer for a dataset, replacing one with the same ID.
    pub fn set_callback(
        &self,
        dataset: impl Into<DatasetName>,
        consumer_id: impl Into<ConsumerId>,
        consumer: Arc<dyn EventConsumer>,
    ) -> Option<Arc<dyn EventConsumer>> {
        self.registry.register(dataset, consumer_id, consumer)
    }

    /// Remove a consumer. Returns whether it was registered.
    pub fn remove_callback(
        &self,
        dataset: impl Into<DatasetName>,
        consumer_id: impl Into<ConsumerId>,
    ) -> bool {
        self.registry
            .unregister(&dataset.into(), &consumer_id.into())
    }

    /// Spawn the stream task on the current tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| NotifyError::NoRuntime)?;

        let mut worker = self.worker.lock();
        if let Some(active) = worker.as_ref() {
            if !active.handle.is_finished() {
                return Err(NotifyError::AlreadyRunning);
            }
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let resilience = ResilienceLoop::new(
            Arc::clone(&self.connector),
            Dispatcher::new(Arc::clone(&self.registry)),
            self.config.retry,
            shutdown_rx,
            Arc::clone(&self.state),
        );

        let handle = runtime.spawn(resilience.run());
        *worker = Some(Worker {
            handle,
            shutdown_tx,
        });

        info!("KNMI notification service started");
        Ok(())
    }

    /// Stop the stream task and wait for it to close its session.
    ///
    /// The task is aborted if it does not finish within the configured
    /// shutdown timeout. Stopping a stopped service is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let worker = self.worker.lock().take();
        let Some(Worker {
            mut handle,
            shutdown_tx,
        }) = worker
        else {
            debug!("KNMI notification service is not running");
            return Ok(());
        };

        // The task may already have exited, in which case nobody is listening.
        let _ = shutdown_tx.try_send(());
        drop(shutdown_tx);

        let limit: Duration = self.config.shutdown_timeout;
        match timeout(limit, &mut handle).await {
            Ok(Ok(())) => {
                info!("KNMI notification service stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                self.state.send_replace(ConnectionState::Stopped);
                Err(NotifyError::ShutdownError(format!(
                    "Notification task failed: {e}"
                )))
            }
            Err(_) => {
                warn!("KNMI notification task did not stop within {:?}, aborting", limit);
                handle.abort();
                self.state.send_replace(ConnectionState::Stopped);
                Err(NotifyError::ShutdownError(format!(
                    "Notification task shutdown timed out after {limit:?}"
                )))
            }
        }
    }

    /// Whether the stream task is running.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

impl Drop for NotificationService {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            if !worker.handle.is_finished() {
                debug!("Aborting KNMI notification task on drop");
                worker.handle.abort();
            }
        }
    }
}

impl std::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationService")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("state", &self.connection_state())
            .field("running", &self.is_running())
            .finish()
    }
}
