use std::time::Duration;

use serde::{Deserialize, Serialize};
use triage_core::error::AppError;

pub mod anthropic;
pub mod bedrock;
pub mod credentials;
pub mod sigv4;

use anthropic::AnthropicBackend;
use bedrock::BedrockBackend;
use credentials::CredentialSource;

/// Near-deterministic sampling; structured output matters more than variety.
pub const ANALYSIS_TEMPERATURE: f32 = 0.3;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn user_prompt(prompt: &str, max_tokens: u32) -> Self {
        Self {
            messages: vec![Message {
                role: Role::User,
                content: prompt.to_string(),
            }],
            max_tokens,
            temperature: ANALYSIS_TEMPERATURE,
        }
    }
}

/// A text-completion service. Implementations make one blocking attempt per call.
pub trait InferenceBackend {
    /// Short name used in error markers, e.g. `Bedrock`.
    fn name(&self) -> &str;
    /// Provenance label stamped on analyses.
    fn analyzed_by(&self) -> &str;
    fn max_tokens(&self) -> u32;
    fn complete(&self, request: &CompletionRequest) -> Result<String, AppError>;
}

/// Result of one inference call. A failure still carries text for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutput {
    Completion(String),
    Failed { marker: String, error: AppError },
}

impl InferenceOutput {
    pub fn text(&self) -> &str {
        match self {
            InferenceOutput::Completion(text) => text,
            InferenceOutput::Failed { marker, .. } => marker,
        }
    }

    pub fn error(&self) -> Option<&AppError> {
        match self {
            InferenceOutput::Completion(_) => None,
            InferenceOutput::Failed { error, .. } => Some(error),
        }
    }
}

/// Send `prompt` to `backend`. Never fails: errors become an `Error calling ...` marker.
pub fn infer(backend: &dyn InferenceBackend, prompt: &str) -> InferenceOutput {
    let request = CompletionRequest::user_prompt(prompt, backend.max_tokens());
    tracing::info!(backend = backend.name(), max_tokens = request.max_tokens, "calling inference backend");
    match backend.complete(&request) {
        Ok(text) => {
            tracing::info!(backend = backend.name(), chars = text.len(), "inference response received");
            InferenceOutput::Completion(text)
        }
        Err(error) => {
            tracing::warn!(backend = backend.name(), error = %error.describe(), "inference call failed");
            InferenceOutput::Failed {
                marker: format!("Error calling {}: {}", backend.name(), error.describe()),
                error,
            }
        }
    }
}

/// Which backend to use; chosen by configuration, never by probing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSelection {
    Bedrock { region: String, model_id: String },
    Anthropic { api_key: Option<String>, model: String },
}

/// Build the configured backend. `credentials` is consulted for Bedrock only.
pub fn select_backend(
    selection: &BackendSelection,
    credentials: &dyn CredentialSource,
) -> Result<Box<dyn InferenceBackend>, AppError> {
    match selection {
        BackendSelection::Bedrock { region, model_id } => {
            let credentials = credentials.credentials(region)?;
            tracing::info!(%region, %model_id, "using Bedrock inference backend");
            Ok(Box::new(BedrockBackend::new(region, model_id, credentials)))
        }
        BackendSelection::Anthropic { api_key, model } => {
            let Some(api_key) = api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
                return Err(AppError::new(
                    "CONFIG_MISSING_API_KEY",
                    "CLAUDE_API_KEY is required when Bedrock is disabled",
                ));
            };
            tracing::info!(%model, "using Anthropic inference backend");
            Ok(Box::new(AnthropicBackend::new(api_key, model)))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

fn truncate_for_details(body: String) -> String {
    const LIMIT: usize = 512;
    if body.len() <= LIMIT {
        return body;
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Decode a messages-style reply (`content[0].text`) shared by both backends.
pub(crate) fn read_messages_reply(
    resp: Result<ureq::Response, ureq::Error>,
    backend: &str,
) -> Result<String, AppError> {
    match resp {
        Ok(r) if (200..300).contains(&r.status()) => {
            let v: MessagesResponse = r.into_json().map_err(|e| {
                AppError::new("AI_BACKEND_FAILED", format!("Failed to decode {backend} response"))
                    .with_details(e.to_string())
            })?;
            match v.content.into_iter().next().and_then(|block| block.text) {
                Some(text) => Ok(text),
                None => Err(AppError::new(
                    "AI_BACKEND_EMPTY",
                    format!("No content in {backend} response"),
                )),
            }
        }
        Ok(r) => Err(
            AppError::new("AI_BACKEND_FAILED", format!("{backend} request failed"))
                .with_details(format!("status={}", r.status())),
        ),
        Err(ureq::Error::Status(code, r)) => {
            let body = r.into_string().unwrap_or_default();
            Err(
                AppError::new("AI_BACKEND_FAILED", format!("{backend} request failed"))
                    .with_details(format!("status={code}; body={}", truncate_for_details(body)))
                    .with_retryable(code == 429 || code >= 500),
            )
        }
        Err(e) => Err(
            AppError::new("AI_BACKEND_UNREACHABLE", format!("Failed to reach {backend}"))
                .with_details(e.to_string())
                .with_retryable(true),
        ),
    }
}
