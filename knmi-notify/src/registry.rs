//! Dataset to consumer registration.
//!
//! Collaborators register consumers during their own setup and remove them on
//! teardown, at any time and from any task, while the stream task reads the
//! registry for every event.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::dataset::DatasetName;
use crate::event::NotificationEvent;

/// Error returned by a failing consumer.
pub type ConsumerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a single consumer invocation.
pub type ConsumerResult = Result<(), ConsumerError>;

/// Identifies a consumer within one dataset.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ConsumerId(pub String);

impl ConsumerId {
    /// Create a new consumer ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the consumer ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ConsumerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ConsumerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives every event of the dataset it is registered for.
///
/// Implementations may suspend (for example to refresh their own data) and may
/// fail; a failure only affects this consumer for this event.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Handle one event.
    async fn on_event(&self, event: Arc<NotificationEvent>) -> ConsumerResult;
}

#[async_trait]
impl<F, Fut> EventConsumer for F
where
    F: Fn(Arc<NotificationEvent>) -> Fut + Send + Sync,
    Fut: Future<Output = ConsumerResult> + Send + 'static,
{
    async fn on_event(&self, event: Arc<NotificationEvent>) -> ConsumerResult {
        (self)(event).await
    }
}

/// Wrap an async closure as a consumer.
///
/// ```
/// use knmi_notify::consumer_fn;
///
/// let consumer = consumer_fn(|event| async move {
///     println!("new file for {}", event.dataset());
///     Ok(())
/// });
/// # drop(consumer);
/// ```
pub fn consumer_fn<F, Fut>(f: F) -> Arc<dyn EventConsumer>
where
    F: Fn(Arc<NotificationEvent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ConsumerResult> + Send + 'static,
{
    Arc::new(f)
}

/// A consumer together with the ID it was registered under.
pub type DispatchTarget = (ConsumerId, Arc<dyn EventConsumer>);

/// Thread-safe mapping from dataset to its registered consumers.
///
/// Lookups return a point-in-time copy of one dataset's consumer set, taken
/// while holding that dataset's shard lock, so a concurrent mutation is seen
/// either entirely or not at all.
#[derive(Default)]
pub struct DatasetRegistry {
    consumers: DashMap<DatasetName, HashMap<ConsumerId, Arc<dyn EventConsumer>>>,
}

impl DatasetRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer, replacing any consumer with the same ID for that
    /// dataset.
    ///
    /// Datasets outside the subscribed set are accepted; they simply never
    /// receive events. Returns the replaced consumer, if any.
    pub fn register(
        &self,
        dataset: impl Into<DatasetName>,
        consumer_id: impl Into<ConsumerId>,
        consumer: Arc<dyn EventConsumer>,
    ) -> Option<Arc<dyn EventConsumer>> {
        let dataset = dataset.into();
        let consumer_id = consumer_id.into();
        tracing::debug!("Registering consumer {} for dataset {}", consumer_id, dataset);

        self.consumers
            .entry(dataset)
            .or_default()
            .insert(consumer_id, consumer)
    }

    /// Remove a consumer. Returns whether it was registered.
    pub fn unregister(&self, dataset: &DatasetName, consumer_id: &ConsumerId) -> bool {
        let removed = match self.consumers.get_mut(dataset) {
            Some(mut consumers) => consumers.remove(consumer_id).is_some(),
            None => false,
        };

        if removed {
            tracing::debug!("Unregistered consumer {} for dataset {}", consumer_id, dataset);
            self.consumers
                .remove_if(dataset, |_, consumers| consumers.is_empty());
        }

        removed
    }

    /// Snapshot of the consumers registered for a dataset.
    pub fn dispatch_targets(&self, dataset: &DatasetName) -> Vec<DispatchTarget> {
        self.consumers
            .get(dataset)
            .map(|consumers| {
                consumers
                    .iter()
                    .map(|(id, consumer)| (id.clone(), Arc::clone(consumer)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of consumers registered for a dataset.
    pub fn consumer_count(&self, dataset: &DatasetName) -> usize {
        self.consumers
            .get(dataset)
            .map(|consumers| consumers.len())
            .unwrap_or(0)
    }

    /// Whether a consumer is registered for a dataset.
    pub fn is_registered(&self, dataset: &DatasetName, consumer_id: &ConsumerId) -> bool {
        self.consumers
            .get(dataset)
            .map(|consumers| consumers.contains_key(consumer_id))
            .unwrap_or(false)
    }

    /// Datasets with at least one registered consumer.
    pub fn datasets(&self) -> Vec<DatasetName> {
        self.consumers
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl std::fmt::Debug for DatasetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for entry in self.consumers.iter() {
            let ids: Vec<&ConsumerId> = entry.value().keys().collect();
            map.entry(entry.key(), &ids);
        }
        map.finish()
    }
}
