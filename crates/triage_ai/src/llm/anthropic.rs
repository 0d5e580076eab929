use serde::Serialize;
use triage_core::error::AppError;

use super::{read_messages_reply, CompletionRequest, InferenceBackend, Message, REQUEST_TIMEOUT};

pub const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Direct vendor API, authenticated with an API key.
#[derive(Clone)]
pub struct AnthropicBackend {
    api_key: String,
    model: String,
    url: String,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("model", &self.model)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl AnthropicBackend {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            url: MESSAGES_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: &'a [Message],
}

impl InferenceBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "Anthropic"
    }

    fn analyzed_by(&self) -> &str {
        "claude-ai"
    }

    fn max_tokens(&self) -> u32 {
        DEFAULT_MAX_TOKENS
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, AppError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: &request.messages,
        };
        let body = serde_json::to_value(body).map_err(|e| {
            AppError::new("AI_BACKEND_FAILED", "Failed to encode Anthropic request")
                .with_details(e.to_string())
        })?;

        let resp = ureq::post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .set("x-api-key", &self.api_key)
            .set("anthropic-version", API_VERSION)
            .send_json(body);

        read_messages_reply(resp, self.name())
    }
}
