//! Dataset identities, topic filters and the process session identity.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Topic filters subscribed on every (re)connect, in this order.
pub const TOPIC_FILTERS: [&str; 2] = [
    KnownDataset::TenMinuteObservations.topic_filter(),
    KnownDataset::RadarForecast.topic_filter(),
];

/// Routing key of an event: the dataset it was published for.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetName(pub String);

impl DatasetName {
    /// Create a new dataset name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the dataset name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DatasetName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for DatasetName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<KnownDataset> for DatasetName {
    fn from(dataset: KnownDataset) -> Self {
        Self(dataset.name().to_string())
    }
}

impl std::fmt::Display for DatasetName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Datasets whose notifications this client subscribes to.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum KnownDataset {
    /// 10-minute in-situ meteorological observations
    TenMinuteObservations,
    /// Precipitation radar forecast
    RadarForecast,
}

impl KnownDataset {
    /// All known datasets, in subscription order.
    pub const ALL: [KnownDataset; 2] = [
        KnownDataset::TenMinuteObservations,
        KnownDataset::RadarForecast,
    ];

    /// Dataset name as it appears in `data.datasetName`.
    pub const fn name(self) -> &'static str {
        match self {
            KnownDataset::TenMinuteObservations => "10-minute-in-situ-meteorological-observations",
            KnownDataset::RadarForecast => "radar_forecast",
        }
    }

    /// Dataset version the topic filter is pinned to.
    pub const fn version(self) -> &'static str {
        match self {
            KnownDataset::TenMinuteObservations => "1.0",
            KnownDataset::RadarForecast => "2.0",
        }
    }

    /// Topic filter matching every file notification of this dataset version.
    pub const fn topic_filter(self) -> &'static str {
        match self {
            KnownDataset::TenMinuteObservations => {
                "dataplatform/file/v1/10-minute-in-situ-meteorological-observations/1.0/#"
            }
            KnownDataset::RadarForecast => "dataplatform/file/v1/radar_forecast/2.0/#",
        }
    }

    /// Look up a known dataset by its name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dataset| dataset.name() == name)
    }
}

impl std::fmt::Display for KnownDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// MQTT client identity, generated once per process.
///
/// Every session opened by this process presents the same identifier, so
/// reconnects take over the previous broker-side session instead of appearing
/// as a new client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity(String);

impl SessionIdentity {
    /// The identity of the current process.
    pub fn process() -> Self {
        static IDENTITY: OnceLock<String> = OnceLock::new();
        Self(
            IDENTITY
                .get_or_init(|| uuid::Uuid::new_v4().to_string())
                .clone(),
        )
    }

    /// Get the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
