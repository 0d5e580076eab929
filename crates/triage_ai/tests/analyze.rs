use std::cell::RefCell;

use pretty_assertions::assert_eq;
use serde_json::json;

use triage_ai::analyze::analyze_incident;
use triage_ai::analyze::prompts::analysis_prompt;
use triage_ai::llm::credentials::LookupCredentials;
use triage_ai::llm::{infer, select_backend, BackendSelection, CompletionRequest, InferenceBackend, Role};
use triage_core::error::AppError;
use triage_core::normalize::normalize;
use triage_core::severity::Severity;

struct MockBackend {
    out: Result<String, AppError>,
    seen: RefCell<Vec<CompletionRequest>>,
}

impl MockBackend {
    fn replying(out: &str) -> Self {
        Self {
            out: Ok(out.to_string()),
            seen: RefCell::new(Vec::new()),
        }
    }

    fn failing(err: AppError) -> Self {
        Self {
            out: Err(err),
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl InferenceBackend for MockBackend {
    fn name(&self) -> &str {
        "Mock"
    }

    fn analyzed_by(&self) -> &str {
        "mock-ai"
    }

    fn max_tokens(&self) -> u32 {
        123
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, AppError> {
        self.seen.borrow_mut().push(request.clone());
        self.out.clone()
    }
}

fn crash_loop_event() -> serde_json::Value {
    json!({
        "detail-type": "K8s Pod Failure",
        "time": "2026-03-01T12:00:00Z",
        "detail": {
            "pod_name": "api-7d9f",
            "namespace": "prod",
            "status": "CrashLoopBackOff",
            "restart_count": 5
        }
    })
}

#[test]
fn prompt_embeds_incident_identity_and_json() {
    let incident = normalize(crash_loop_event());
    let prompt = analysis_prompt(&incident).expect("prompt");
    assert!(prompt.contains("Source: kubernetes"));
    assert!(prompt.contains("Type: pod_failure"));
    assert!(prompt.contains("Timestamp: 2026-03-01T12:00:00Z"));
    assert!(prompt.contains("\"pod_name\": \"api-7d9f\""));
    assert!(prompt.contains("critical|high|medium|low"));
    assert!(prompt.trim_end().ends_with("Provide ONLY the JSON response."));
}

#[test]
fn analysis_uses_backend_reply() {
    let backend = MockBackend::replying(
        r#"```json
{"severity": "high", "title": "Crash loop", "root_cause": "OOM", "impact": "API down",
 "immediate_actions": ["Raise memory limit"], "resolution_steps": ["Tune heap"], "prevention": ["Load test"]}
```"#,
    );
    let incident = normalize(crash_loop_event());
    let analysis = analyze_incident(&backend, &incident).expect("analysis");

    assert_eq!(analysis.severity, Severity::High);
    assert_eq!(analysis.title, "Crash loop");
    assert_eq!(analysis.analyzed_by, "mock-ai");
    assert!(analysis.fallback_reason.is_none());

    let seen = backend.seen.borrow();
    assert_eq!(seen.len(), 1, "exactly one attempt");
    assert_eq!(seen[0].max_tokens, 123);
    assert_eq!(seen[0].temperature, 0.3);
    assert_eq!(seen[0].messages.len(), 1);
    assert_eq!(seen[0].messages[0].role, Role::User);
    let wire = serde_json::to_value(&seen[0].messages[0]).expect("serialize message");
    assert_eq!(wire["role"], "user");
}

#[test]
fn backend_failure_degrades_to_default_analysis() {
    let backend = MockBackend::failing(
        AppError::new("AI_BACKEND_UNREACHABLE", "Failed to reach Mock").with_details("timed out"),
    );
    let incident = normalize(crash_loop_event());
    let analysis = analyze_incident(&backend, &incident).expect("analysis");

    assert_eq!(analysis.severity, Severity::Medium);
    assert_eq!(analysis.title, "Incident requires investigation");
    assert_eq!(
        analysis.fallback_reason.as_deref(),
        Some("Error calling Mock: [AI_BACKEND_UNREACHABLE] Failed to reach Mock: timed out")
    );
}

#[test]
fn infer_reports_marker_and_error() {
    let backend = MockBackend::failing(AppError::new("AI_BACKEND_EMPTY", "No content in Mock response"));
    let out = infer(&backend, "hi");
    assert_eq!(out.text(), "Error calling Mock: [AI_BACKEND_EMPTY] No content in Mock response");
    assert_eq!(out.error().map(|e| e.code.as_str()), Some("AI_BACKEND_EMPTY"));
}

#[test]
fn backend_selection_validates_configuration() {
    let no_env = |_: &str| None;
    let no_env = LookupCredentials::new(&no_env);

    let err = select_backend(
        &BackendSelection::Anthropic {
            api_key: Some("  ".to_string()),
            model: "claude-3-5-sonnet-20241022".to_string(),
        },
        &no_env,
    )
    .err()
    .expect("blank key rejected");
    assert_eq!(err.code, "CONFIG_MISSING_API_KEY");

    let backend = select_backend(
        &BackendSelection::Anthropic {
            api_key: Some("sk-test".to_string()),
            model: "claude-3-5-sonnet-20241022".to_string(),
        },
        &no_env,
    )
    .expect("anthropic backend");
    assert_eq!(backend.analyzed_by(), "claude-ai");
    assert_eq!(backend.max_tokens(), 2000);

    let err = select_backend(
        &BackendSelection::Bedrock {
            region: "us-east-1".to_string(),
            model_id: "anthropic.claude-3-sonnet-20240229-v1:0".to_string(),
        },
        &no_env,
    )
    .err()
    .expect("missing aws credentials");
    assert_eq!(err.code, "AI_AWS_CREDENTIALS_MISSING");

    let task_role = |key: &str| match key {
        "AWS_ACCESS_KEY_ID" => Some("ASIAEXAMPLE".to_string()),
        "AWS_SECRET_ACCESS_KEY" => Some("secret".to_string()),
        _ => None,
    };
    let backend = select_backend(
        &BackendSelection::Bedrock {
            region: "eu-west-1".to_string(),
            model_id: "anthropic.claude-3-sonnet-20240229-v1:0".to_string(),
        },
        &LookupCredentials::new(&task_role),
    )
    .expect("bedrock backend");
    assert_eq!(backend.name(), "Bedrock");
    assert_eq!(backend.analyzed_by(), "claude-ai-bedrock");
}
