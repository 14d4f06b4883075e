//! Muninn error types

use std::time::Duration;

/// Whether a failed remote call is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network hiccup, timeout, 5xx or explicit rate limit. Retried.
    Transient,
    /// Bad credentials, malformed request, invalid payload. Never retried.
    Fatal,
}

/// Muninn error types
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    // Backend/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("context length exceeded for model {model}")]
    ContextLengthExceeded { model: String },

    /// The backend answered, but its payload failed schema validation.
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration / selection errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// Every candidate failed its availability probe.
    #[error("no analysis backend available (tried: {})", tried.join(", "))]
    NoBackendAvailable { tried: Vec<String> },

    /// Transient failures on every attempt; `source` is the last one.
    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<MuninnError>,
    },

    /// Every batch of a run failed; nothing to report.
    #[error("all {failed} batches failed, last error: {last_error}")]
    AllBatchesFailed { failed: usize, last_error: String },

    /// Cache I/O or parse failure. Recovered inside `CacheStore`.
    #[error("cache error: {0}")]
    Cache(String),
}

impl MuninnError {
    /// Whether this error is worth retrying.
    ///
    /// Timeouts, connection failures, rate limits and 408/5xx responses are
    /// transient. Everything else (auth, 4xx, schema failures) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            MuninnError::Http(_) | MuninnError::Timeout(_) | MuninnError::RateLimited { .. } => true,
            MuninnError::Api { status, .. } => *status == 408 || *status >= 500,
            _ => false,
        }
    }

    /// [`ErrorClass`] view of [`is_transient()`](Self::is_transient).
    pub fn classify(&self) -> ErrorClass {
        if self.is_transient() {
            ErrorClass::Transient
        } else {
            ErrorClass::Fatal
        }
    }

    /// Backend-provided wait hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            MuninnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Errors that stop a whole run rather than skipping a single batch.
    ///
    /// Bad credentials or configuration affect every batch equally, so there
    /// is no point continuing with the next one.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            MuninnError::AuthenticationFailed
                | MuninnError::Configuration(_)
                | MuninnError::UnknownBackend(_)
                | MuninnError::NoBackendAvailable { .. }
        )
    }

    /// Process exit status for the CLI layer.
    ///
    /// `2` = nothing reachable, `3` = unrecoverable batch failure,
    /// `1` = anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            MuninnError::NoBackendAvailable { .. } => 2,
            MuninnError::AllBatchesFailed { .. }
            | MuninnError::AuthenticationFailed
            | MuninnError::RetriesExhausted { .. } => 3,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for MuninnError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MuninnError::Timeout(err.to_string())
        } else if err.is_decode() {
            MuninnError::InvalidResponse(err.to_string())
        } else {
            MuninnError::Http(err.to_string())
        }
    }
}

/// Result type alias for Muninn operations
pub type Result<T> = std::result::Result<T, MuninnError>;
