use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::AppError;

/// Inbound event shapes, in dispatch priority order.
///
/// A leaf field of the wrong JSON type is dropped on its own and takes its default. A nested
/// section that is not a JSON object fails the whole shape.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    CloudWatchAlarm(CloudWatchAlarmEvent),
    K8sPod(K8sPodEvent),
    Rds(RdsEvent),
    BusDelivery(BusDeliveryEvent),
    Generic,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct CloudWatchAlarmEvent {
    #[serde(deserialize_with = "lenient")]
    pub time: Option<String>,
    pub detail: AlarmDetail,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlarmDetail {
    #[serde(deserialize_with = "lenient")]
    pub alarm_name: Option<String>,
    pub state: AlarmState,
    pub configuration: AlarmConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct AlarmState {
    #[serde(deserialize_with = "lenient")]
    pub value: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AlarmConfiguration {
    #[serde(deserialize_with = "lenient")]
    pub metrics: Option<Vec<Value>>,
    #[serde(deserialize_with = "lenient")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct K8sPodEvent {
    #[serde(deserialize_with = "lenient")]
    pub time: Option<String>,
    pub detail: PodDetail,
}

/// Pod fields shared by the watcher's detail-type events and direct bus deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct PodDetail {
    #[serde(deserialize_with = "lenient")]
    pub pod_name: Option<String>,
    /// Accepted for `K8s Pod` detail-type events only.
    #[serde(rename = "podName", deserialize_with = "lenient")]
    pub pod_name_camel: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub namespace: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub reason: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub message: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub cluster_name: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub node_name: Option<String>,
    #[serde(deserialize_with = "lenient_count")]
    pub restart_count: Option<u32>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).ok())
}

/// Non-negative integers, also when sent as a decimal string.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let count = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(count.and_then(|c| u32::try_from(c).ok()))
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct RdsEvent {
    #[serde(deserialize_with = "lenient")]
    pub time: Option<String>,
    pub detail: RdsDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RdsDetail {
    #[serde(deserialize_with = "lenient")]
    pub source_identifier: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub event_categories: Option<Vec<String>>,
    #[serde(deserialize_with = "lenient")]
    pub message: Option<String>,
}

/// Direct bus delivery: top-level `Source`, embedded `Detail` (string-encoded or structured).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BusDeliveryEvent {
    pub time: Option<String>,
    pub source: Option<String>,
    pub kind: Option<String>,
    pub timestamp: Option<String>,
    pub pod: PodDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct BusDetailMeta {
    #[serde(deserialize_with = "lenient")]
    source: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient")]
    kind: Option<String>,
    #[serde(deserialize_with = "lenient")]
    timestamp: Option<String>,
}

impl InboundEvent {
    /// Classify and decode an event. Total: a shape whose body does not match its schema
    /// decodes as [`InboundEvent::Generic`].
    pub fn decode(raw: &Value) -> InboundEvent {
        match Self::try_decode(raw) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    code = %err.code,
                    details = err.details.as_deref().unwrap_or(""),
                    "event matched a known shape but failed to decode; using generic incident"
                );
                InboundEvent::Generic
            }
        }
    }

    fn try_decode(raw: &Value) -> Result<InboundEvent, AppError> {
        let detail_type = raw.get("detail-type").and_then(Value::as_str);

        if let Some(detail_type) = detail_type {
            if detail_type.contains("CloudWatch Alarm") {
                return decode_shape(raw, "CloudWatch Alarm").map(InboundEvent::CloudWatchAlarm);
            }
            if detail_type.contains("K8s Pod") {
                return decode_shape(raw, "K8s Pod").map(InboundEvent::K8sPod);
            }
            if detail_type.contains("RDS") {
                return decode_shape(raw, "RDS").map(InboundEvent::Rds);
            }
        }

        if raw.get("Source").is_some() {
            return decode_bus_delivery(raw).map(InboundEvent::BusDelivery);
        }

        Ok(InboundEvent::Generic)
    }
}

fn decode_shape<T: DeserializeOwned>(raw: &Value, shape: &str) -> Result<T, AppError> {
    T::deserialize(raw).map_err(|e| {
        AppError::new("EVENT_SHAPE_MISMATCH", "Event body does not match its shape")
            .with_details(format!("shape={shape}; err={e}"))
    })
}

fn decode_bus_delivery(raw: &Value) -> Result<BusDeliveryEvent, AppError> {
    let detail = match raw.get("Detail") {
        None | Some(Value::Null) => Value::Object(Default::default()),
        Some(Value::String(encoded)) => serde_json::from_str(encoded).map_err(|e| {
            AppError::new("EVENT_DETAIL_INVALID", "Embedded Detail is not valid JSON")
                .with_details(e.to_string())
        })?,
        Some(other) => other.clone(),
    };

    let meta: BusDetailMeta = decode_shape(&detail, "bus Detail")?;
    let pod: PodDetail = decode_shape(&detail, "bus Detail")?;

    Ok(BusDeliveryEvent {
        time: raw.get("Time").and_then(Value::as_str).map(str::to_string),
        source: meta.source,
        kind: meta.kind,
        timestamp: meta.timestamp,
        pod,
    })
}
