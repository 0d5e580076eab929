use serde_json::Value;

use crate::domain::{CanonicalIncident, IncidentDetails, IncidentSource, PodFailure};

pub mod events;
pub mod timestamps;

use events::{InboundEvent, PodDetail};
use timestamps::now_rfc3339_utc;

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn or_default(value: Option<String>, default: &str) -> String {
    value.unwrap_or_else(|| default.to_string())
}

fn pod_failure(detail: PodDetail, accept_camel_name: bool) -> PodFailure {
    let defaults = PodFailure::default();
    let camel = if accept_camel_name {
        detail.pod_name_camel
    } else {
        None
    };
    PodFailure {
        pod_name: detail.pod_name.or(camel).unwrap_or(defaults.pod_name),
        namespace: detail.namespace.unwrap_or(defaults.namespace),
        status: detail.status.unwrap_or(defaults.status),
        reason: detail.reason.unwrap_or(defaults.reason),
        message: detail.message.unwrap_or(defaults.message),
        cluster_name: detail.cluster_name.unwrap_or(defaults.cluster_name),
        node_name: detail.node_name.unwrap_or(defaults.node_name),
        restart_count: detail.restart_count.unwrap_or(defaults.restart_count),
    }
}

/// Map any inbound event to a canonical incident. Total: unrecognized or undecodable
/// shapes become the generic `unknown` incident. The event is kept as `raw_event`.
pub fn normalize(raw_event: Value) -> CanonicalIncident {
    let (source, kind, timestamp, details) = match InboundEvent::decode(&raw_event) {
        InboundEvent::CloudWatchAlarm(event) => {
            let alarm = event.detail;
            (
                IncidentSource::CloudWatchAlarm,
                "infrastructure".to_string(),
                non_empty(event.time),
                IncidentDetails::CloudWatchAlarm {
                    alarm_name: or_default(alarm.alarm_name, "Unknown"),
                    state: or_default(alarm.state.value, "UNKNOWN"),
                    reason: alarm.state.reason.unwrap_or_default(),
                    metrics: alarm.configuration.metrics.unwrap_or_default(),
                    namespace: alarm.configuration.namespace.unwrap_or_default(),
                },
            )
        }
        InboundEvent::K8sPod(event) => (
            IncidentSource::Kubernetes,
            "pod_failure".to_string(),
            non_empty(event.time),
            IncidentDetails::Kubernetes(pod_failure(event.detail, true)),
        ),
        InboundEvent::Rds(event) => {
            let detail = event.detail;
            (
                IncidentSource::Rds,
                "database_issue".to_string(),
                non_empty(event.time),
                IncidentDetails::Rds {
                    db_instance: or_default(detail.source_identifier, "Unknown"),
                    event_categories: detail.event_categories.unwrap_or_default(),
                    message: detail.message.unwrap_or_default(),
                },
            )
        }
        InboundEvent::BusDelivery(event) => (
            non_empty(event.source)
                .map(|s| IncidentSource::from_label(&s))
                .unwrap_or(IncidentSource::Kubernetes),
            non_empty(event.kind).unwrap_or_else(|| "pod_failure".to_string()),
            non_empty(event.timestamp).or_else(|| non_empty(event.time)),
            IncidentDetails::Kubernetes(pod_failure(event.pod, false)),
        ),
        InboundEvent::Generic => (
            IncidentSource::Unknown,
            "generic".to_string(),
            None,
            IncidentDetails::Generic,
        ),
    };

    let incident = CanonicalIncident {
        source,
        kind,
        timestamp: timestamp.unwrap_or_else(now_rfc3339_utc),
        details,
        raw_event,
        cluster_context: None,
    };
    tracing::debug!(
        source = %incident.source,
        kind = %incident.kind,
        timestamp = %incident.timestamp,
        "normalized inbound event"
    );
    incident
}
