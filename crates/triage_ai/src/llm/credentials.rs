use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use triage_core::error::AppError;

use super::sigv4::AwsCredentials;

/// Where Bedrock request-signing credentials come from. Resolved once per backend.
pub trait CredentialSource {
    fn credentials(&self, region: &str) -> Result<AwsCredentials, AppError>;
}

/// Static `AWS_*` values read through a lookup function.
pub struct LookupCredentials<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> LookupCredentials<'a> {
    pub fn new(lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { lookup }
    }
}

impl CredentialSource for LookupCredentials<'_> {
    fn credentials(&self, _region: &str) -> Result<AwsCredentials, AppError> {
        AwsCredentials::from_lookup(self.lookup)
    }
}

/// The AWS SDK default provider chain: environment, shared profile files, web identity,
/// the ECS container role, then the instance profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCredentialChain;

impl CredentialSource for DefaultCredentialChain {
    fn credentials(&self, region: &str) -> Result<AwsCredentials, AppError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                AppError::new("AI_AWS_CREDENTIALS_FAILED", "Failed to start the AWS credential resolver")
                    .with_details(e.to_string())
            })?;

        runtime.block_on(async {
            let config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .load()
                .await;
            let Some(provider) = config.credentials_provider() else {
                return Err(missing_credentials().with_details("no credential provider configured"));
            };
            let credentials = provider
                .provide_credentials()
                .await
                .map_err(|e| missing_credentials().with_details(e.to_string()))?;
            tracing::debug!(access_key_id = credentials.access_key_id(), "resolved AWS credentials");
            Ok(AwsCredentials::from(&credentials))
        })
    }
}

fn missing_credentials() -> AppError {
    AppError::new(
        "AI_AWS_CREDENTIALS_MISSING",
        "AWS credentials are required for the Bedrock backend",
    )
}

impl From<&Credentials> for AwsCredentials {
    fn from(credentials: &Credentials) -> Self {
        Self {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().map(str::to_string),
        }
    }
}
