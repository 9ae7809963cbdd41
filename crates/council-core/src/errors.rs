//! Error taxonomy split by lifecycle stage, the same way a build-time config
//! error is kept distinct from a call-time gateway error elsewhere:
//! `ProviderError` is produced by an adapter for a single call, `CoreError`
//! is what `processRequest` surfaces to its caller.

use thiserror::Error;

use crate::models::ErrorKind;

/// Error returned by a single adapter call, already normalized into one of
/// the canonical error kinds below.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Error kinds the core surfaces to callers.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("provider {provider_id} is not configured")]
    ProviderNotConfigured { provider_id: String },

    #[error("provider {provider_id} is disabled: {reason}")]
    ProviderDisabled { provider_id: String, reason: String },

    #[error("request timed out")]
    Timeout,

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("authentication error: {0}")]
    AuthenticationError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error(
        "insufficient members: {successful} succeeded, {required} required"
    )]
    InsufficientMembers { successful: usize, required: usize },

    #[error("global deadline exceeded after {elapsed_ms}ms")]
    GlobalDeadlineExceeded { elapsed_ms: u64 },

    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("unknown error: {0}")]
    UnknownError(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::ProviderNotConfigured { .. } => ErrorKind::ProviderNotConfigured,
            CoreError::ProviderDisabled { .. } => ErrorKind::ProviderDisabled,
            CoreError::Timeout => ErrorKind::Timeout,
            CoreError::RateLimit(_) => ErrorKind::RateLimit,
            CoreError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            CoreError::AuthenticationError(_) => ErrorKind::AuthenticationError,
            CoreError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            CoreError::NetworkError(_) => ErrorKind::NetworkError,
            CoreError::InsufficientMembers { .. } => ErrorKind::InsufficientMembers,
            CoreError::GlobalDeadlineExceeded { .. } => ErrorKind::GlobalDeadlineExceeded,
            CoreError::SynthesisFailed(_) => ErrorKind::SynthesisFailed,
            CoreError::UnknownError(_) => ErrorKind::UnknownError,
        }
    }
}

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        match err.kind {
            ErrorKind::Timeout => CoreError::Timeout,
            ErrorKind::RateLimit => CoreError::RateLimit(err.message),
            ErrorKind::ServiceUnavailable => CoreError::ServiceUnavailable(err.message),
            ErrorKind::AuthenticationError => CoreError::AuthenticationError(err.message),
            ErrorKind::InvalidRequest => CoreError::InvalidRequest(err.message),
            ErrorKind::NetworkError => CoreError::NetworkError(err.message),
            ErrorKind::ProviderNotConfigured => CoreError::ProviderNotConfigured {
                provider_id: err.message,
            },
            ErrorKind::ProviderDisabled => CoreError::ProviderDisabled {
                provider_id: String::new(),
                reason: err.message,
            },
            ErrorKind::InsufficientMembers => CoreError::InsufficientMembers {
                successful: 0,
                required: 0,
            },
            ErrorKind::GlobalDeadlineExceeded => {
                CoreError::GlobalDeadlineExceeded { elapsed_ms: 0 }
            }
            ErrorKind::SynthesisFailed => CoreError::SynthesisFailed(err.message),
            ErrorKind::UnknownError => CoreError::UnknownError(err.message),
        }
    }
}

/// Classifies a raw HTTP status + body snippet into a `ProviderError` kind.
/// Adapters call this once per response; they never retry (that's the
/// pool's job).
pub fn classify_http_status(status: u16, body_snippet: &str) -> ErrorKind {
    if body_snippet.to_ascii_lowercase().contains("timeout") {
        return ErrorKind::Timeout;
    }
    match status {
        429 => ErrorKind::RateLimit,
        503 => ErrorKind::ServiceUnavailable,
        401 | 403 => ErrorKind::AuthenticationError,
        400..=499 => ErrorKind::InvalidRequest,
        _ => ErrorKind::UnknownError,
    }
}
