//! Notification event schema and decoder.
//!
//! Notifications are JSON objects with a required `data` object, which in turn
//! must carry a non-empty `datasetName`. Everything else is passed through to
//! consumers untouched.

use mqtt_session::RawMessage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::dataset::{DatasetName, KnownDataset};

/// A decoded notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// Event payload; carries the routing key
    pub data: EventData,

    /// Topic the notification was received on
    #[serde(skip)]
    pub topic: String,

    /// All other top-level fields (`id`, `type`, `source`, `time`, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `data` object of a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Dataset the notification belongs to
    #[serde(rename = "datasetName")]
    pub dataset_name: DatasetName,

    /// All other fields of the data object
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationEvent {
    /// The dataset this event is routed by.
    pub fn dataset(&self) -> &DatasetName {
        &self.data.dataset_name
    }

    /// The dataset as a known dataset, if it is one.
    pub fn known_dataset(&self) -> Option<KnownDataset> {
        KnownDataset::from_name(self.data.dataset_name.as_str())
    }

    /// Event identifier, when present.
    pub fn id(&self) -> Option<&str> {
        self.extra.get("id").and_then(Value::as_str)
    }

    /// Event type, when present.
    pub fn event_type(&self) -> Option<&str> {
        self.extra.get("type").and_then(Value::as_str)
    }

    /// Event time, when present.
    pub fn time(&self) -> Option<&str> {
        self.extra.get("time").and_then(Value::as_str)
    }

    /// The full event as a JSON value, as it was received.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

impl EventData {
    /// Dataset version, when present.
    pub fn dataset_version(&self) -> Option<&str> {
        self.extra.get("datasetVersion").and_then(Value::as_str)
    }

    /// Name of the published file, when present.
    pub fn filename(&self) -> Option<&str> {
        self.extra
            .get("filename")
            .or_else(|| self.extra.get("fileName"))
            .and_then(Value::as_str)
    }

    /// Download URL of the published file, when present.
    pub fn url(&self) -> Option<&str> {
        self.extra.get("url").and_then(Value::as_str)
    }
}

/// Decode a raw message into a notification event.
///
/// Returns `None` for anything that is not a valid notification. Malformed
/// input from the publisher is routine and never an error.
pub fn decode(message: &RawMessage) -> Option<NotificationEvent> {
    trace!("MQTT payload on {}: {:?}", message.topic, message.payload_str());

    let mut event = match serde_json::from_slice::<NotificationEvent>(&message.payload) {
        Ok(event) => event,
        Err(e) => {
            debug!("Ignoring MQTT event on {}: {}", message.topic, e);
            return None;
        }
    };

    if event.data.dataset_name.as_str().is_empty() {
        debug!("Ignoring MQTT event without datasetName on {}", message.topic);
        return None;
    }

    event.topic = message.topic.clone();
    debug!("MQTT event for dataset {}", event.data.dataset_name);
    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const TOPIC: &str = "dataplatform/file/v1/radar_forecast/2.0/created";

    fn message(payload: &str) -> RawMessage {
        RawMessage::new(TOPIC, payload.to_string())
    }

    #[rstest]
    #[case::not_json("not json at all")]
    #[case::empty("")]
    #[case::array("[1, 2, 3]")]
    #[case::string(r#""data""#)]
    #[case::no_data(r#"{"notdata":1}"#)]
    #[case::data_null(r#"{"data":null}"#)]
    #[case::data_not_object(r#"{"data":"radar_forecast"}"#)]
    #[case::no_dataset_name(r#"{"data":{"fileName":"x.h5"}}"#)]
    #[case::dataset_name_not_string(r#"{"data":{"datasetName":42}}"#)]
    #[case::dataset_name_empty(r#"{"data":{"datasetName":""}}"#)]
    fn test_malformed_payloads_yield_nothing(#[case] payload: &str) {
        assert!(decode(&message(payload)).is_none());
    }

    #[test]
    fn test_invalid_utf8_yields_nothing() {
        let message = RawMessage::new(TOPIC, vec![0xff, 0x00, 0xfe]);
        assert!(decode(&message).is_none());
    }

    #[test]
    fn test_decode_minimal_event() {
        let event = decode(&message(
            r#"{"data":{"datasetName":"radar_forecast","fileName":"x.h5"}}"#,
        ))
        .expect("valid event");

        assert_eq!(event.dataset().as_str(), "radar_forecast");
        assert_eq!(event.known_dataset(), Some(KnownDataset::RadarForecast));
        assert_eq!(event.data.filename(), Some("x.h5"));
        assert_eq!(event.topic, TOPIC);
        assert!(event.extra.is_empty());
    }

    #[test]
    fn test_decode_cloud_event_envelope() {
        let payload = r#"{
            "specversion": "1.0",
            "type": "nl.knmi.dataplatform.file.created.v1",
            "source": "https://dataplatform.knmi.nl",
            "id": "a1b2c3",
            "time": "2024-05-01T12:00:00Z",
            "data": {
                "datasetName": "10-minute-in-situ-meteorological-observations",
                "datasetVersion": "1.0",
                "filename": "KMDS__OPER_P___10M_OBS_L2_202405011200.nc",
                "url": "https://api.dataplatform.knmi.nl/open-data/v1/datasets/x/versions/1.0/files/y/url"
            }
        }"#;

        let event = decode(&message(payload)).expect("valid event");
        assert_eq!(event.known_dataset(), Some(KnownDataset::TenMinuteObservations));
        assert_eq!(event.id(), Some("a1b2c3"));
        assert_eq!(event.event_type(), Some("nl.knmi.dataplatform.file.created.v1"));
        assert_eq!(event.time(), Some("2024-05-01T12:00:00Z"));
        assert_eq!(event.data.dataset_version(), Some("1.0"));
        assert_eq!(
            event.data.filename(),
            Some("KMDS__OPER_P___10M_OBS_L2_202405011200.nc")
        );
        assert!(event.data.url().is_some());
        assert_eq!(event.extra.get("specversion"), Some(&Value::from("1.0")));
    }

    #[test]
    fn test_unknown_dataset_still_decodes() {
        let event = decode(&message(r#"{"data":{"datasetName":"unknown-set"}}"#))
            .expect("valid event");
        assert_eq!(event.dataset().as_str(), "unknown-set");
        assert_eq!(event.known_dataset(), None);
    }

    #[test]
    fn test_to_value_preserves_all_fields() {
        let payload = r#"{"id":7,"data":{"datasetName":"radar_forecast","nested":{"a":[1,2]}},"extra":true}"#;
        let event = decode(&message(payload)).expect("valid event");

        let original: Value = serde_json::from_str(payload).unwrap();
        assert_eq!(event.to_value(), original);
        // non-string envelope fields pass through but have no typed accessor
        assert_eq!(event.id(), None);
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode(&RawMessage::new(TOPIC, bytes));
        }

        #[test]
        fn prop_any_non_empty_dataset_name_routes(name in "[a-zA-Z0-9_.-]{1,40}") {
            let payload = serde_json::json!({ "data": { "datasetName": name.clone() } }).to_string();
            let event = decode(&message(&payload)).expect("valid event");
            prop_assert_eq!(event.dataset().as_str(), name.as_str());
        }
    }
}
