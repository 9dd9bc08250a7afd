//! Typed errors for provider calls
//!
//! Providers never surface these for ordinary remote failures; they are
//! folded into [`QueryOutcome::Failed`](super::QueryOutcome) with the error's
//! display text as the reason. Only contract violations escape as `Err`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// Credential rejected or missing (HTTP 401/403, no API token)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Quota exceeded (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Malformed request or caller contract violation (HTTP 400, empty input)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Server-side error (HTTP 5xx)
    #[error("Service error: {0}")]
    ServiceError(String),

    /// Connection failure or deadline exceeded
    #[error("Network error: {0}")]
    Network(String),

    /// Response arrived but could not be interpreted
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LlmError {
    pub fn from_http_status(status: reqwest::StatusCode, error_text: String) -> Self {
        match status.as_u16() {
            401 | 403 => LlmError::Unauthorized(error_text),
            429 => LlmError::RateLimited(error_text),
            400 => LlmError::BadRequest(error_text),
            500..=599 => LlmError::ServiceError(error_text),
            _ => LlmError::Other(anyhow::anyhow!("HTTP {}: {}", status, error_text)),
        }
    }

    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            LlmError::Network(format!("Connection failed: {}", e))
        } else if e.is_decode() {
            LlmError::MalformedResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_http_status(status, e.to_string())
        } else {
            LlmError::Other(e.into())
        }
    }
}
