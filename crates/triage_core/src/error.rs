use serde::{Deserialize, Serialize};
use std::fmt;

/// Single structured error shape shared by every stage of the triage pipeline.
///
/// Downstream integrations swallow these at their own boundary; only the
/// normalize/infer/reconcile chain lets one reach the handler response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// One-line description including details, used for error markers and
    /// handler failure bodies.
    pub fn describe(&self) -> String {
        match self.details.as_deref() {
            Some(details) if !details.is_empty() => format!("{self}: {details}"),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
