use std::time::Duration;

use serde_json::{json, Value};
use triage_core::domain::{AnalysisResult, CanonicalIncident};
use triage_core::error::AppError;
use triage_core::severity::Severity;

use crate::dispatch::PagingClient;

pub const EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

// Events API v2 rejects longer summaries.
const MAX_SUMMARY_CHARS: usize = 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn paging_severity(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::High => "error",
        Severity::Medium => "warning",
        Severity::Low => "info",
    }
}

/// Events API v2 trigger. The incident id is the dedup key so repeats collapse into one page.
pub fn build_trigger_event(
    routing_key: &str,
    analysis: &AnalysisResult,
    incident: &CanonicalIncident,
) -> Value {
    let summary: String = format!("[{}] {}", analysis.incident_id, analysis.title)
        .chars()
        .take(MAX_SUMMARY_CHARS)
        .collect();
    let source = incident.subject().unwrap_or(analysis.source.label());

    json!({
        "routing_key": routing_key,
        "event_action": "trigger",
        "dedup_key": analysis.incident_id,
        "payload": {
            "summary": summary,
            "source": source,
            "severity": paging_severity(analysis.severity),
            "timestamp": analysis.timestamp,
            "component": analysis.source.label(),
            "custom_details": {
                "incident_id": analysis.incident_id,
                "type": incident.kind,
                "root_cause": analysis.root_cause,
                "impact": analysis.impact,
                "immediate_actions": analysis.immediate_actions,
                "resolution_steps": analysis.resolution_steps,
                "prevention": analysis.prevention,
                "analyzed_by": analysis.analyzed_by
            }
        }
    })
}

#[derive(Debug, Clone)]
pub struct PagerDutyClient {
    url: String,
}

impl Default for PagerDutyClient {
    fn default() -> Self {
        Self {
            url: EVENTS_URL.to_string(),
        }
    }
}

impl PagerDutyClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PagingClient for PagerDutyClient {
    fn create_incident(
        &self,
        routing_key: &str,
        analysis: &AnalysisResult,
        incident: &CanonicalIncident,
    ) -> Result<(), AppError> {
        let event = build_trigger_event(routing_key, analysis, incident);
        let resp = ureq::post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .send_json(&event);

        match resp {
            Ok(r) if (200..300).contains(&r.status()) => Ok(()),
            Ok(r) => Err(
                AppError::new("NOTIFY_PAGERDUTY_FAILED", "PagerDuty rejected the event")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(code, r)) => {
                let body = r.into_string().unwrap_or_default();
                Err(
                    AppError::new("NOTIFY_PAGERDUTY_FAILED", "PagerDuty rejected the event")
                        .with_details(format!("status={code}; body={body}"))
                        .with_retryable(code == 429 || code >= 500),
                )
            }
            Err(e) => Err(
                AppError::new("NOTIFY_PAGERDUTY_UNREACHABLE", "Failed to reach PagerDuty")
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}
