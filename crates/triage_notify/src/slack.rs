use std::time::Duration;

use serde_json::{json, Value};
use triage_core::domain::{AnalysisResult, CanonicalIncident};
use triage_core::error::AppError;
use triage_core::normalize::timestamps::{display_utc, now_rfc3339_utc, unix_now};
use triage_core::severity::{format_severity, label_escalates};

pub const MAX_RECOMMENDATIONS: usize = 5;
pub const FOOTER: &str = "AI Incident Detection System";
pub const FOOTER_ICON: &str = "https://cdn-icons-png.flaticon.com/512/4712/4712139.png";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// What an incident alert shows. `severity` is any label; unknown labels render grey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertView {
    pub severity: String,
    pub incident_id: String,
    pub source: String,
    pub summary: String,
    pub recommendations: Vec<String>,
    pub timestamp: String,
    pub pod_name: String,
    pub namespace: String,
    pub reason: String,
}

impl AlertView {
    pub fn from_analysis(analysis: &AnalysisResult, incident: &CanonicalIncident) -> Self {
        let ctx = incident.display_context();
        Self {
            severity: analysis.severity.as_str().to_string(),
            incident_id: analysis.incident_id.clone(),
            source: analysis.source.label().to_string(),
            summary: analysis.title.clone(),
            recommendations: analysis.immediate_actions.clone(),
            timestamp: analysis.timestamp.clone(),
            pod_name: ctx.pod_name.to_string(),
            namespace: ctx.namespace.to_string(),
            reason: ctx.reason.to_string(),
        }
    }

    /// The connectivity check alert.
    pub fn test_alert(now_unix: i64, timestamp: &str) -> Self {
        Self {
            severity: "LOW".to_string(),
            incident_id: format!("TEST-{now_unix}"),
            source: "Test System".to_string(),
            summary: "This is a test message from the AI Incident Detection System".to_string(),
            recommendations: vec![
                "Verify Slack integration is working".to_string(),
                "Check webhook URL configuration".to_string(),
            ],
            timestamp: timestamp.to_string(),
            pod_name: String::new(),
            namespace: String::new(),
            reason: String::new(),
        }
    }
}

pub fn recommendations_text(items: &[String]) -> String {
    if items.is_empty() {
        return "No specific recommendations provided".to_string();
    }
    let mut text = items
        .iter()
        .take(MAX_RECOMMENDATIONS)
        .map(|item| format!("• {item}"))
        .collect::<Vec<_>>()
        .join("\n");
    if items.len() > MAX_RECOMMENDATIONS {
        text.push_str(&format!(
            "\n• ... and {} more recommendations",
            items.len() - MAX_RECOMMENDATIONS
        ));
    }
    text
}

fn mrkdwn(text: String) -> Value {
    json!({ "type": "mrkdwn", "text": text })
}

/// Block Kit payload for an incident alert. `sent_at` is the attachment `ts` (unix seconds).
pub fn build_incident_payload(view: &AlertView, sent_at: i64) -> Value {
    let severity = view.severity.to_uppercase();
    let style = format_severity(&view.severity);
    let id = &view.incident_id;

    let mut fields = vec![
        mrkdwn(format!("*Incident ID:*\n{id}")),
        mrkdwn(format!("*Source:*\n{}", view.source)),
    ];
    for (label, value) in [
        ("Pod Name", &view.pod_name),
        ("Namespace", &view.namespace),
        ("Reason", &view.reason),
    ] {
        if !value.is_empty() {
            fields.push(mrkdwn(format!("*{label}:*\n`{value}`")));
        }
    }
    fields.push(mrkdwn(format!("*Severity:*\n{severity}")));
    fields.push(mrkdwn(format!("*Time:*\n{}", display_utc(&view.timestamp))));

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": {
                "type": "plain_text",
                "text": format!("{} Incident Alert - {severity}", style.glyph),
                "emoji": true
            }
        }),
        json!({ "type": "section", "fields": fields }),
        json!({ "type": "section", "text": mrkdwn(format!("*Summary:*\n{}", view.summary)) }),
        json!({
            "type": "section",
            "text": mrkdwn(format!(
                "*AI Recommendations:*\n{}",
                recommendations_text(&view.recommendations)
            ))
        }),
    ];

    if label_escalates(&view.severity) {
        blocks.push(json!({
            "type": "actions",
            "elements": [
                {
                    "type": "button",
                    "text": { "type": "plain_text", "text": "🚨 Acknowledge", "emoji": true },
                    "style": "danger",
                    "value": format!("ack_{id}"),
                    "action_id": "acknowledge_incident"
                },
                {
                    "type": "button",
                    "text": { "type": "plain_text", "text": "📊 View Details", "emoji": true },
                    "value": format!("details_{id}"),
                    "action_id": "view_incident_details"
                }
            ]
        }));
    }
    blocks.push(json!({ "type": "divider" }));

    json!({
        "text": format!("{} {severity} Incident Alert: {id}", style.glyph),
        "blocks": blocks,
        "attachments": [{
            "color": style.color,
            "text": format!("Incident {id} detected and analyzed by AI"),
            "footer": FOOTER,
            "footer_icon": FOOTER_ICON,
            "ts": sent_at
        }]
    })
}

pub fn level_glyph(level: &str) -> &'static str {
    match level.to_ascii_uppercase().as_str() {
        "WARNING" => "⚠️",
        "ERROR" => "❌",
        _ => "💡",
    }
}

/// Non-incident operational message. `sent_at` is the display time shown in the footer.
pub fn build_system_notification(message: &str, level: &str, sent_at: &str) -> Value {
    let glyph = level_glyph(level);
    json!({
        "text": format!("{glyph} System Notification"),
        "blocks": [
            {
                "type": "section",
                "text": mrkdwn(format!("{glyph} *System Notification - {level}*\n\n{message}"))
            },
            {
                "type": "context",
                "elements": [mrkdwn(format!("{FOOTER} • {sent_at}"))]
            }
        ]
    })
}

/// Incoming-webhook chat client.
#[derive(Clone)]
pub struct SlackNotifier {
    webhook_url: String,
}

impl std::fmt::Debug for SlackNotifier {
    // The webhook URL is a credential.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackNotifier").finish_non_exhaustive()
    }
}

impl SlackNotifier {
    pub fn new(webhook_url: &str) -> Result<Self, AppError> {
        let webhook_url = webhook_url.trim();
        if webhook_url.is_empty() {
            return Err(AppError::new(
                "CONFIG_MISSING_WEBHOOK",
                "Slack webhook URL must be provided or set in SLACK_WEBHOOK_URL",
            ));
        }
        Ok(Self {
            webhook_url: webhook_url.to_string(),
        })
    }

    pub fn send_incident_alert(&self, view: &AlertView) -> Result<(), AppError> {
        self.post(&build_incident_payload(view, unix_now()))?;
        tracing::info!(incident_id = %view.incident_id, channel = "slack", "incident alert sent");
        Ok(())
    }

    pub fn send_test_message(&self) -> Result<(), AppError> {
        self.send_incident_alert(&AlertView::test_alert(unix_now(), &now_rfc3339_utc()))
    }

    pub fn send_system_notification(&self, message: &str, level: &str) -> Result<(), AppError> {
        let sent_at = display_utc(&now_rfc3339_utc());
        self.post(&build_system_notification(message, level, &sent_at))
    }

    fn post(&self, payload: &Value) -> Result<(), AppError> {
        let resp = ureq::post(&self.webhook_url)
            .timeout(REQUEST_TIMEOUT)
            .send_json(payload);

        match resp {
            Ok(r) if (200..300).contains(&r.status()) => Ok(()),
            Ok(r) => Err(
                AppError::new("NOTIFY_SLACK_FAILED", "Slack webhook rejected the message")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(code, r)) => {
                let body = r.into_string().unwrap_or_default();
                Err(
                    AppError::new("NOTIFY_SLACK_FAILED", "Slack webhook rejected the message")
                        .with_details(format!("status={code}; body={body}"))
                        .with_retryable(code == 429 || code >= 500),
                )
            }
            Err(e) => Err(
                AppError::new("NOTIFY_SLACK_UNREACHABLE", "Failed to reach Slack")
                    .with_details(e.to_string())
                    .with_retryable(true),
            ),
        }
    }
}
