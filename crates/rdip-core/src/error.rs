use thiserror::Error;

use crate::models::Provider;

/// Maximum length of an error message stored on a job record.
pub const MAX_ERROR_LEN: usize = 200;

/// Application-wide error types for rdip.
#[derive(Error, Debug)]
pub enum AppError {
    /// The submitted URL does not reference a discussion thread.
    #[error("Invalid Reddit URL format: {0}")]
    InvalidUrl(String),

    /// The thread does not exist or is not visible.
    #[error("Post not found (may be deleted or private)")]
    NotFound,

    /// Thread extraction failed for any other reason.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// Request payload rejected before any work started.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// LLM API call failed.
    #[error("LLM error ({provider}, HTTP {status_code}): {message}")]
    LlmError {
        provider: Provider,
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// No provider was configured, under its token ceiling, and admitted.
    #[error("No LLM available")]
    NoProviderAvailable,

    /// Every attempted provider failed.
    #[error("All LLMs failed. Last error: {last_error}")]
    AllProvidersFailed { last_error: String },

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Missing or malformed configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::LlmError { retryable, .. } => *retryable,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if the error stems from caller input rather than the system.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::InvalidUrl(_) | AppError::InvalidInput(_))
    }

    /// The message recorded on a failed job, bounded to [`MAX_ERROR_LEN`] characters.
    pub fn job_message(&self) -> String {
        truncate_chars(&self.to_string(), MAX_ERROR_LEN)
    }
}

/// Truncate a string to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
