use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::severity::Severity;

pub mod cluster;

pub use cluster::ClusterContext;

/// Where an incident came from.
///
/// Bus deliveries may name their own source; labels outside the known set are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IncidentSource {
    CloudWatchAlarm,
    Kubernetes,
    Rds,
    Unknown,
    Other(String),
}

impl IncidentSource {
    pub fn from_label(label: &str) -> Self {
        match label {
            "cloudwatch_alarm" => IncidentSource::CloudWatchAlarm,
            "kubernetes" => IncidentSource::Kubernetes,
            "rds" => IncidentSource::Rds,
            "unknown" => IncidentSource::Unknown,
            other => IncidentSource::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            IncidentSource::CloudWatchAlarm => "cloudwatch_alarm",
            IncidentSource::Kubernetes => "kubernetes",
            IncidentSource::Rds => "rds",
            IncidentSource::Unknown => "unknown",
            IncidentSource::Other(label) => label,
        }
    }
}

impl From<String> for IncidentSource {
    fn from(label: String) -> Self {
        IncidentSource::from_label(&label)
    }
}

impl From<IncidentSource> for String {
    fn from(source: IncidentSource) -> Self {
        source.label().to_string()
    }
}

impl std::fmt::Display for IncidentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields of a failing pod, as reported by the cluster watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodFailure {
    pub pod_name: String,
    pub namespace: String,
    pub status: String,
    pub reason: String,
    pub message: String,
    pub cluster_name: String,
    pub node_name: String,
    pub restart_count: u32,
}

impl Default for PodFailure {
    fn default() -> Self {
        Self {
            pod_name: "Unknown".to_string(),
            namespace: "default".to_string(),
            status: "Unknown".to_string(),
            reason: String::new(),
            message: String::new(),
            cluster_name: "Unknown".to_string(),
            node_name: String::new(),
            restart_count: 0,
        }
    }
}

/// Source-specific payload of a canonical incident. Every field carries a default.
#[derive(Debug, Clone, PartialEq)]
pub enum IncidentDetails {
    CloudWatchAlarm {
        alarm_name: String,
        state: String,
        reason: String,
        metrics: Vec<Value>,
        namespace: String,
    },
    Kubernetes(PodFailure),
    Rds {
        db_instance: String,
        event_categories: Vec<String>,
        message: String,
    },
    Generic,
}

/// Normalized, shape-independent record that all downstream stages operate on.
///
/// `source`, `kind` and `timestamp` are never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalIncident {
    pub source: IncidentSource,
    pub kind: String,
    pub timestamp: String,
    pub details: IncidentDetails,
    pub raw_event: Value,
    pub cluster_context: Option<ClusterContext>,
}

/// Optional context shown in the chat field grid. Empty strings mean "not applicable".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayContext<'a> {
    pub pod_name: &'a str,
    pub namespace: &'a str,
    pub reason: &'a str,
}

impl CanonicalIncident {
    pub fn pod_failure(&self) -> Option<&PodFailure> {
        match &self.details {
            IncidentDetails::Kubernetes(pod) => Some(pod),
            _ => None,
        }
    }

    pub fn display_context(&self) -> DisplayContext<'_> {
        match &self.details {
            IncidentDetails::Kubernetes(pod) => DisplayContext {
                pod_name: &pod.pod_name,
                namespace: &pod.namespace,
                reason: &pod.reason,
            },
            IncidentDetails::CloudWatchAlarm {
                namespace, reason, ..
            } => DisplayContext {
                pod_name: "",
                namespace,
                reason,
            },
            IncidentDetails::Rds { .. } | IncidentDetails::Generic => DisplayContext::default(),
        }
    }

    /// The affected resource, when the event names one.
    pub fn subject(&self) -> Option<&str> {
        let subject = match &self.details {
            IncidentDetails::Kubernetes(pod) => Some(pod.pod_name.as_str()),
            IncidentDetails::CloudWatchAlarm { alarm_name, .. } => Some(alarm_name.as_str()),
            IncidentDetails::Rds { db_instance, .. } => Some(db_instance.as_str()),
            IncidentDetails::Generic => None,
        };
        subject.filter(|s| !s.is_empty())
    }

    /// Flat JSON view: identity fields, then source-specific fields, then `raw_event`.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("source".into(), Value::String(self.source.label().to_string()));
        out.insert("type".into(), Value::String(self.kind.clone()));
        out.insert("timestamp".into(), Value::String(self.timestamp.clone()));

        match &self.details {
            IncidentDetails::CloudWatchAlarm {
                alarm_name,
                state,
                reason,
                metrics,
                namespace,
            } => {
                out.insert("alarm_name".into(), alarm_name.clone().into());
                out.insert("state".into(), state.clone().into());
                out.insert("reason".into(), reason.clone().into());
                out.insert("metrics".into(), Value::Array(metrics.clone()));
                out.insert("namespace".into(), namespace.clone().into());
            }
            IncidentDetails::Kubernetes(pod) => {
                if let Ok(Value::Object(fields)) = serde_json::to_value(pod) {
                    out.extend(fields);
                }
            }
            IncidentDetails::Rds {
                db_instance,
                event_categories,
                message,
            } => {
                out.insert("db_instance".into(), db_instance.clone().into());
                out.insert("event_category".into(), event_categories.clone().into());
                out.insert("message".into(), message.clone().into());
            }
            IncidentDetails::Generic => {}
        }

        if let Some(ctx) = &self.cluster_context {
            if let Ok(v) = serde_json::to_value(ctx) {
                out.insert("cluster_context".into(), v);
            }
        }
        out.insert("raw_event".into(), self.raw_event.clone());
        Value::Object(out)
    }
}

impl Serialize for CanonicalIncident {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Structured analysis of one incident. Always fully populated.
///
/// `incident_id`, `timestamp`, `source` and `analyzed_by` are stamped by the reconciler and
/// never taken from model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub severity: Severity,
    pub title: String,
    pub root_cause: String,
    pub impact: String,
    pub immediate_actions: Vec<String>,
    pub resolution_steps: Vec<String>,
    pub prevention: Vec<String>,
    pub incident_id: String,
    pub timestamp: String,
    pub source: IncidentSource,
    pub analyzed_by: String,
    /// Why the safe default analysis was substituted, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}
