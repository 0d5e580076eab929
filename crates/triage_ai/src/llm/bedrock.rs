use serde::Serialize;
use time::OffsetDateTime;
use triage_core::error::AppError;

use super::sigv4::{self, AwsCredentials, SigningRequest};
use super::{read_messages_reply, CompletionRequest, InferenceBackend, Message, REQUEST_TIMEOUT};

pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
const SIGNING_SERVICE: &str = "bedrock";
const CONTENT_TYPE: &str = "application/json";

/// Managed inference gateway (Bedrock runtime `InvokeModel`), signed with SigV4.
#[derive(Debug, Clone)]
pub struct BedrockBackend {
    region: String,
    model_id: String,
    credentials: AwsCredentials,
}

#[derive(Debug, Clone, Serialize)]
struct InvokeBody<'a> {
    anthropic_version: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: &'a [Message],
}

impl BedrockBackend {
    pub fn new(region: &str, model_id: &str, credentials: AwsCredentials) -> Self {
        Self {
            region: region.to_string(),
            model_id: model_id.to_string(),
            credentials,
        }
    }

    pub fn host(&self) -> String {
        format!("bedrock-runtime.{}.amazonaws.com", self.region)
    }

    /// Request path with the model id percent-encoded (`:` becomes `%3A`).
    pub fn invoke_path(&self) -> String {
        format!("/model/{}/invoke", sigv4::uri_encode(&self.model_id, true))
    }
}

impl InferenceBackend for BedrockBackend {
    fn name(&self) -> &str {
        "Bedrock"
    }

    fn analyzed_by(&self) -> &str {
        "claude-ai-bedrock"
    }

    fn max_tokens(&self) -> u32 {
        DEFAULT_MAX_TOKENS
    }

    fn complete(&self, request: &CompletionRequest) -> Result<String, AppError> {
        let body = serde_json::to_vec(&InvokeBody {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: &request.messages,
        })
        .map_err(|e| {
            AppError::new("AI_BACKEND_FAILED", "Failed to encode Bedrock request")
                .with_details(e.to_string())
        })?;

        let host = self.host();
        let path = self.invoke_path();
        let signed = sigv4::sign(
            &SigningRequest {
                method: "POST",
                host: &host,
                path: &path,
                region: &self.region,
                service: SIGNING_SERVICE,
                content_type: CONTENT_TYPE,
                body: &body,
            },
            &self.credentials,
            OffsetDateTime::now_utc(),
        )?;

        tracing::debug!(model_id = %self.model_id, %host, "invoking Bedrock model");
        let mut call = ureq::post(&format!("https://{host}{path}"))
            .timeout(REQUEST_TIMEOUT)
            .set("content-type", CONTENT_TYPE)
            .set("accept", CONTENT_TYPE)
            .set("x-amz-date", &signed.amz_date)
            .set("x-amz-content-sha256", &signed.content_sha256)
            .set("authorization", &signed.authorization);
        if let Some(token) = signed.security_token.as_deref() {
            call = call.set("x-amz-security-token", token);
        }

        read_messages_reply(call.send_bytes(&body), self.name())
    }
}
