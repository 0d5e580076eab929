use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use time::{format_description, OffsetDateTime, UtcOffset};
use triage_core::error::AppError;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AwsCredentials {
    /// Resolve credentials from the standard `AWS_*` variables via `lookup`.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let (Some(access_key_id), Some(secret_access_key)) =
            (get("AWS_ACCESS_KEY_ID"), get("AWS_SECRET_ACCESS_KEY"))
        else {
            return Err(AppError::new(
                "AI_AWS_CREDENTIALS_MISSING",
                "AWS credentials are required for the Bedrock backend",
            )
            .with_details("set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY"));
        };
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: get("AWS_SESSION_TOKEN"),
        })
    }
}

/// The parts of an HTTP request covered by the signature. `path` is the request path as sent
/// (already percent-encoded).
#[derive(Debug, Clone)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub content_type: &'a str,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub content_sha256: String,
    pub authorization: String,
    pub security_token: Option<String>,
}

/// Percent-encode everything outside the unreserved set. `/` is kept unless `encode_slash`.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for b in input.bytes() {
        let keep = b.is_ascii_alphanumeric()
            || matches!(b, b'-' | b'_' | b'.' | b'~')
            || (b == b'/' && !encode_slash);
        if keep {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, AppError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|e| {
        AppError::new("AI_SIGNING_FAILED", "Failed to initialize request signer")
            .with_details(e.to_string())
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn format_utc(at: OffsetDateTime, fmt: &str) -> Result<String, AppError> {
    let items = format_description::parse(fmt).map_err(|e| {
        AppError::new("AI_SIGNING_FAILED", "Invalid signing time format").with_details(e.to_string())
    })?;
    at.to_offset(UtcOffset::UTC).format(&items).map_err(|e| {
        AppError::new("AI_SIGNING_FAILED", "Failed to format signing time").with_details(e.to_string())
    })
}

/// Sign a request with AWS Signature Version 4 (header-based, no query string).
pub fn sign(
    req: &SigningRequest<'_>,
    credentials: &AwsCredentials,
    at: OffsetDateTime,
) -> Result<SignedHeaders, AppError> {
    let amz_date = format_utc(at, "[year][month][day]T[hour][minute][second]Z")?;
    let date = format_utc(at, "[year][month][day]")?;
    let content_sha256 = hex::encode(Sha256::digest(req.body));

    let mut headers: Vec<(&str, &str)> = vec![
        ("content-type", req.content_type),
        ("host", req.host),
        ("x-amz-date", amz_date.as_str()),
    ];
    if let Some(token) = credentials.session_token.as_deref() {
        headers.push(("x-amz-security-token", token));
    }
    headers.sort_by(|a, b| a.0.cmp(b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{k}:{}\n", v.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(k, _)| *k)
        .collect::<Vec<_>>()
        .join(";");

    // Non-S3 services sign the already-encoded path encoded once more.
    let canonical_uri = uri_encode(req.path, false);
    let canonical_request = [
        req.method,
        canonical_uri.as_str(),
        "",
        canonical_headers.as_str(),
        signed_headers.as_str(),
        content_sha256.as_str(),
    ]
    .join("\n");

    let scope = format!("{date}/{}/{}/aws4_request", req.region, req.service);
    let request_digest = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = [
        ALGORITHM,
        amz_date.as_str(),
        scope.as_str(),
        request_digest.as_str(),
    ]
    .join("\n");

    let secret = format!("AWS4{}", credentials.secret_access_key);
    let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, req.region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, req.service.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

    Ok(SignedHeaders {
        authorization: format!(
            "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
        amz_date,
        content_sha256,
        security_token: credentials.session_token.clone(),
    })
}
