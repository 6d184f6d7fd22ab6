//! Per-event fan-out to the consumers of its dataset.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::dataset::DatasetName;
use crate::event::NotificationEvent;
use crate::registry::{ConsumerId, ConsumerResult, DatasetRegistry};

/// Outcome of dispatching one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Dataset the event was routed by
    pub dataset: DatasetName,
    /// Consumers that completed successfully
    pub delivered: usize,
    /// Consumers that returned an error or panicked
    pub failed: usize,
}

impl DispatchReport {
    fn empty(dataset: DatasetName) -> Self {
        Self {
            dataset,
            delivered: 0,
            failed: 0,
        }
    }

    /// Number of consumers the event was handed to.
    pub fn targets(&self) -> usize {
        self.delivered + self.failed
    }

    /// Whether no consumer was registered for the event's dataset.
    pub fn is_noop(&self) -> bool {
        self.targets() == 0
    }
}

/// Routes decoded events to the consumers registered for their dataset.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<DatasetRegistry>,
}

enum ConsumerOutcome {
    Completed(ConsumerResult),
    Panicked(String),
}

impl Dispatcher {
    /// Create a dispatcher reading from the given registry.
    pub fn new(registry: Arc<DatasetRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher reads from.
    pub fn registry(&self) -> &Arc<DatasetRegistry> {
        &self.registry
    }

    /// Deliver an event to every consumer of its dataset and wait for all of
    /// them.
    ///
    /// Consumers run concurrently as separate tasks. The target set is a
    /// snapshot taken before the first consumer starts, so registrations made
    /// while this runs only apply to later events. Failures are logged and
    /// counted, never propagated. Dropping the returned future aborts the
    /// consumer tasks.
    pub async fn dispatch(&self, event: NotificationEvent) -> DispatchReport {
        let dataset = event.dataset().clone();
        let mut report = DispatchReport::empty(dataset.clone());

        let targets = self.registry.dispatch_targets(&dataset);
        if targets.is_empty() {
            debug!("Ignoring MQTT dataset {}", dataset);
            return report;
        }

        let event = Arc::new(event);
        let mut tasks: JoinSet<(ConsumerId, ConsumerOutcome)> = JoinSet::new();
        for (consumer_id, consumer) in targets {
            let event = Arc::clone(&event);
            tasks.spawn(async move {
                let outcome = match AssertUnwindSafe(consumer.on_event(event))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => ConsumerOutcome::Completed(result),
                    Err(payload) => ConsumerOutcome::Panicked(panic_message(payload)),
                };
                (consumer_id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, ConsumerOutcome::Completed(Ok(())))) => report.delivered += 1,
                Ok((consumer_id, ConsumerOutcome::Completed(Err(e)))) => {
                    report.failed += 1;
                    error!(
                        "Error handling notification message for {} in consumer {}: {}",
                        dataset, consumer_id, e
                    );
                }
                Ok((consumer_id, ConsumerOutcome::Panicked(message))) => {
                    report.failed += 1;
                    error!(
                        "Consumer {} panicked handling notification message for {}: {}",
                        consumer_id, dataset, message
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    error!("Consumer task for {} did not complete: {}", dataset, e);
                }
            }
        }

        debug!(
            "Dispatched {} event to {} consumers ({} failed)",
            dataset,
            report.targets(),
            report.failed
        );
        report
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
