//! Error types for promptrun.

use thiserror::Error;

/// Primary error type for all promptrun operations.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_s:?}s")]
    RateLimited { retry_after_s: Option<u64> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Run(#[from] RunFailure),

    #[error("Stream ended without a terminal event; no response received")]
    NoResponse,

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Structured failure reported by the execution service through an
/// in-stream `error` event.
///
/// Unlike transport errors this carries machine-usable fields: a stable
/// error code for UI formatting and telemetry, the display name of the
/// prompt the run was executing, and an optional retry hint.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Run failed: {message}")]
pub struct RunFailure {
    pub message: String,
    pub code: Option<String>,
    pub prompt_name: Option<String>,
    pub retry_after_s: Option<u64>,
}

impl RunFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            prompt_name: None,
            retry_after_s: None,
        }
    }

    /// Quota-class failures get a longer user-visible display duration.
    pub fn is_quota(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some("QUOTA_EXCEEDED" | "RATE_LIMITED" | "INSUFFICIENT_CREDITS")
        )
    }
}

/// Coarse classification of a [`RunError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Api,
    Protocol,
    Configuration,
    Serialization,
    Unknown,
}

impl RunError {
    /// Create an API error from a status and body.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Run(failure) if failure.is_quota() => ErrorCategory::RateLimit,
            Self::Run(_) | Self::NoResponse => ErrorCategory::Protocol,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                _ => ErrorCategory::Api,
            },
            Self::InvalidState(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status, .. } => (500..=599).contains(status) || *status == 429,
            _ => matches!(
                self.category(),
                ErrorCategory::RateLimit | ErrorCategory::Network
            ),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RunError>;
