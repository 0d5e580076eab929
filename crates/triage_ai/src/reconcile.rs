use serde_json::{Map, Value};
use triage_core::domain::{AnalysisResult, CanonicalIncident};
use triage_core::identity::incident_id;
use triage_core::severity::Severity;

pub const DEFAULT_TITLE: &str = "Incident requires investigation";
pub const DEFAULT_ROOT_CAUSE: &str = "Analysis in progress";
pub const DEFAULT_IMPACT: &str = "Unknown";
pub const DEFAULT_IMMEDIATE_ACTION: &str = "Investigate the incident";
pub const DEFAULT_RESOLUTION_STEP: &str = "Manual investigation required";
pub const DEFAULT_PREVENTION: &str = "Review after resolution";

/// Strip a markdown code fence, preferring a ```json fence over a bare one.
/// A missing closing fence takes everything after the opening one.
pub fn extract_json_block(text: &str) -> &str {
    let body = if let Some(pos) = text.find("```json") {
        &text[pos + "```json".len()..]
    } else if let Some(pos) = text.find("```") {
        &text[pos + "```".len()..]
    } else {
        return text.trim();
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(extract_json_block(text)) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
        Err(e) => Err(format!("JSON parsing error: {e}")),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn text_field(map: &Map<String, Value>, key: &str, default: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| default.to_string())
}

fn list_field(map: &Map<String, Value>, key: &str, default: &str) -> Vec<String> {
    match map.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => vec![default.to_string()],
    }
}

fn severity_field(map: &Map<String, Value>) -> Severity {
    map.get("severity")
        .and_then(Value::as_str)
        .and_then(Severity::parse)
        .unwrap_or(Severity::Medium)
}

/// Turn raw model text into a fully-populated analysis. Never fails; unusable output yields the
/// safe default analysis with `fallback_reason` set.
pub fn reconcile(raw: &str, incident: &CanonicalIncident, analyzed_by: &str) -> AnalysisResult {
    let (map, fallback_reason) = match parse_object(raw) {
        Ok(map) => (map, None),
        Err(reason) => {
            tracing::warn!(%reason, "model output unusable, substituting default analysis");
            (Map::new(), Some(reason))
        }
    };

    AnalysisResult {
        severity: severity_field(&map),
        title: text_field(&map, "title", DEFAULT_TITLE),
        root_cause: text_field(&map, "root_cause", DEFAULT_ROOT_CAUSE),
        impact: text_field(&map, "impact", DEFAULT_IMPACT),
        immediate_actions: list_field(&map, "immediate_actions", DEFAULT_IMMEDIATE_ACTION),
        resolution_steps: list_field(&map, "resolution_steps", DEFAULT_RESOLUTION_STEP),
        prevention: list_field(&map, "prevention", DEFAULT_PREVENTION),
        incident_id: incident_id(&incident.raw_event),
        timestamp: incident.timestamp.clone(),
        source: incident.source.clone(),
        analyzed_by: analyzed_by.to_string(),
        fallback_reason,
    }
}
