use std::io::Read;
use std::path::Path;

use serde_json::{json, Value};
use triage_ai::analyze::analyze_incident;
use triage_ai::llm::bedrock::{DEFAULT_MODEL_ID, DEFAULT_REGION};
use triage_ai::llm::credentials::CredentialSource;
use triage_ai::llm::{anthropic, select_backend, BackendSelection, InferenceBackend};
use triage_core::domain::{AnalysisResult, CanonicalIncident};
use triage_core::error::AppError;
use triage_core::normalize::normalize;
use triage_k8s::enrich::ClusterEnricher;
use triage_k8s::http::{HttpClusterApi, SERVICE_ACCOUNT_DIR};
use triage_notify::dispatch::{ChatChannel, DispatchReport, Dispatcher, PagingClient};
use triage_notify::slack::SlackNotifier;

/// Handler settings. Empty strings are treated as unset by [`HandlerConfig::normalized`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    pub use_bedrock: bool,
    pub aws_region: String,
    pub bedrock_model_id: String,
    pub claude_api_key: Option<String>,
    pub anthropic_model: String,
    pub slack_webhook_url: Option<String>,
    pub pagerduty_integration_key: Option<String>,
    pub k8s_enrich: bool,
    pub k8s_cluster_name: String,
    pub k8s_api_url: Option<String>,
    pub k8s_token: Option<String>,
    /// Cluster CA bundle; defaults to the mounted service account's `ca.crt`.
    pub k8s_ca_file: Option<String>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            use_bedrock: true,
            aws_region: DEFAULT_REGION.to_string(),
            bedrock_model_id: DEFAULT_MODEL_ID.to_string(),
            claude_api_key: None,
            anthropic_model: anthropic::DEFAULT_MODEL.to_string(),
            slack_webhook_url: None,
            pagerduty_integration_key: None,
            k8s_enrich: false,
            k8s_cluster_name: "unknown".to_string(),
            k8s_api_url: None,
            k8s_token: None,
            k8s_ca_file: None,
        }
    }
}

fn set(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn or_default(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}

impl HandlerConfig {
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            use_bedrock: self.use_bedrock,
            aws_region: or_default(self.aws_region, &defaults.aws_region),
            bedrock_model_id: or_default(self.bedrock_model_id, &defaults.bedrock_model_id),
            claude_api_key: set(self.claude_api_key),
            anthropic_model: or_default(self.anthropic_model, &defaults.anthropic_model),
            slack_webhook_url: set(self.slack_webhook_url),
            pagerduty_integration_key: set(self.pagerduty_integration_key),
            k8s_enrich: self.k8s_enrich,
            k8s_cluster_name: or_default(self.k8s_cluster_name, &defaults.k8s_cluster_name),
            k8s_api_url: set(self.k8s_api_url),
            k8s_token: set(self.k8s_token),
            k8s_ca_file: set(self.k8s_ca_file),
        }
    }

    pub fn backend_selection(&self) -> BackendSelection {
        if self.use_bedrock {
            BackendSelection::Bedrock {
                region: self.aws_region.clone(),
                model_id: self.bedrock_model_id.clone(),
            }
        } else {
            BackendSelection::Anthropic {
                api_key: self.claude_api_key.clone(),
                model: self.anthropic_model.clone(),
            }
        }
    }
}

/// Function-style response: `statusCode` plus a JSON-encoded `body` string.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl HandlerResponse {
    pub fn analyzed(analysis: &AnalysisResult) -> Self {
        Self {
            status_code: 200,
            body: json!({
                "message": "Incident analyzed successfully",
                "severity": analysis.severity,
                "incident_id": analysis.incident_id,
            })
            .to_string(),
        }
    }

    pub fn failed(error: &AppError) -> Self {
        Self {
            status_code: 500,
            body: json!({ "error": error.describe() }).to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Read one event from `path`, or stdin when `path` is `-`.
pub fn read_event(path: &str) -> Result<Value, AppError> {
    let text = if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map_err(|e| {
            AppError::new("HANDLER_READ_FAILED", "Failed to read event from stdin")
                .with_details(e.to_string())
        })?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(|e| {
            AppError::new("HANDLER_READ_FAILED", "Failed to read event file")
                .with_details(format!("path={path}; {e}"))
        })?
    };
    serde_json::from_str(&text).map_err(|e| {
        AppError::new("HANDLER_INVALID_EVENT", "Event is not valid JSON").with_details(e.to_string())
    })
}

/// Everything one event passes through. Optional collaborators are simply skipped.
pub struct Pipeline<'a> {
    pub backend: &'a dyn InferenceBackend,
    pub enricher: Option<&'a ClusterEnricher<'a>>,
    pub dispatcher: &'a Dispatcher<'a>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub incident: CanonicalIncident,
    pub analysis: AnalysisResult,
    pub report: DispatchReport,
}

impl Pipeline<'_> {
    /// Normalize, enrich, analyze, notify. Only analysis setup errors escape; notification
    /// failures are recorded in the report.
    pub fn process(&self, raw_event: Value) -> Result<PipelineOutcome, AppError> {
        let incident = normalize(raw_event);
        let incident = match self.enricher {
            Some(enricher) => enricher.enrich(incident),
            None => incident,
        };
        let analysis = analyze_incident(self.backend, &incident)?;
        let report = self.dispatcher.dispatch(&analysis, &incident);
        Ok(PipelineOutcome {
            incident,
            analysis,
            report,
        })
    }

    pub fn respond(&self, raw_event: Value) -> HandlerResponse {
        match self.process(raw_event) {
            Ok(outcome) => HandlerResponse::analyzed(&outcome.analysis),
            Err(e) => {
                tracing::error!(error = %e.describe(), "error processing incident");
                HandlerResponse::failed(&e)
            }
        }
    }
}

pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Build the configured collaborators and run one event through them.
pub fn handle_event(
    raw_event: Value,
    config: &HandlerConfig,
    credentials: &dyn CredentialSource,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> HandlerResponse {
    tracing::debug!(event = %raw_event, "received event");

    let backend = match select_backend(&config.backend_selection(), credentials) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(error = %e.describe(), "failed to configure inference backend");
            return HandlerResponse::failed(&e);
        }
    };

    let slack = match config.slack_webhook_url.as_deref().map(SlackNotifier::new) {
        Some(Ok(slack)) => Some(slack),
        Some(Err(e)) => {
            tracing::warn!(error = %e.describe(), "slack disabled");
            None
        }
        None => None,
    };
    let paging = paging_client();

    let cluster_api = if config.k8s_enrich {
        match HttpClusterApi::resolve(
            config.k8s_api_url.as_deref(),
            config.k8s_token.as_deref(),
            config.k8s_ca_file.as_deref(),
            Path::new(SERVICE_ACCOUNT_DIR),
            lookup,
        ) {
            Ok(api) => {
                tracing::info!(api_url = api.api_url(), ca_file = ?api.ca_file(), "cluster enrichment enabled");
                Some(api)
            }
            Err(e) => {
                tracing::warn!(error = %e.describe(), "cluster enrichment disabled");
                None
            }
        }
    } else {
        None
    };
    let enricher = cluster_api
        .as_ref()
        .map(|api| ClusterEnricher::new(api, &config.k8s_cluster_name));

    let dispatcher = Dispatcher::new(
        slack.as_ref().map(|s| s as &dyn ChatChannel),
        paging.as_deref(),
        config.pagerduty_integration_key.as_deref(),
    );

    Pipeline {
        backend: backend.as_ref(),
        enricher: enricher.as_ref(),
        dispatcher: &dispatcher,
    }
    .respond(raw_event)
}

#[cfg(feature = "pagerduty")]
fn paging_client() -> Option<Box<dyn PagingClient>> {
    Some(Box::new(triage_notify::pagerduty::PagerDutyClient::new()))
}

#[cfg(not(feature = "pagerduty"))]
fn paging_client() -> Option<Box<dyn PagingClient>> {
    tracing::info!("paging integration not available, skipping");
    None
}
