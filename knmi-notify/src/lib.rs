//! # knmi-notify
//!
//! A resilient notification stream for KNMI data platform datasets.
//!
//! The service keeps one authenticated MQTT session open to the KNMI
//! notification broker, decodes every file notification it receives and hands
//! it to the consumers registered for the notification's dataset. Lost
//! connections are re-established indefinitely with a growing delay until the
//! service is stopped.
//!
//! # Example
//!
//! ```no_run
//! use knmi_notify::{consumer_fn, KnownDataset, NotificationConfig, NotificationService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let token = std::env::var("KNMI_MQTT_TOKEN")?;
//!
//!     if !knmi_notify::validate(&token, &NotificationConfig::default()).await? {
//!         eprintln!("could not reach the broker");
//!     }
//!
//!     let service = NotificationService::new(token, NotificationConfig::default())?;
//!     service.set_callback(
//!         KnownDataset::TenMinuteObservations,
//!         "observations",
//!         consumer_fn(|event| async move {
//!             println!("{:?}", event.data.filename());
//!             Ok(())
//!         }),
//!     );
//!     service.start()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     service.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod config;
pub mod dataset;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod registry;
pub mod resilience;
pub mod service;
pub mod validator;

pub use backoff::{Backoff, RetryPolicy};
pub use config::{NotificationConfig, BROKER_PORT, BROKER_URL, BROKER_USERNAME};
pub use dataset::{DatasetName, KnownDataset, SessionIdentity, TOPIC_FILTERS};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use error::{ConfigError, CredentialError, NotifyError, Result};
pub use event::{decode, EventData, NotificationEvent};
pub use registry::{
    consumer_fn, ConsumerError, ConsumerId, ConsumerResult, DatasetRegistry, EventConsumer,
};
pub use resilience::{ConnectionState, LoopFailure, ResilienceLoop};
pub use service::NotificationService;
pub use validator::{validate, validate_with};

// Transport types needed to implement a custom connector
pub use mqtt_session::{Connector, RawMessage, Session, SessionError};
