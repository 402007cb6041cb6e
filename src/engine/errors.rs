//! Error taxonomy shared across the store, fetcher, discoverer, and worker pool.

use thiserror::Error;

/// Failure classification for a single task attempt.
///
/// Different kinds carry different retry semantics: network failures are
/// usually transient, terminal HTTP errors usually are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, DNS failure, connection reset, 5xx.
    Retryable,
    /// 429 specifically — retryable, but with a longer backoff.
    RateLimited,
    /// 4xx other than 408/429.
    Terminal,
    /// Malformed XML/HTML during discovery — logged, not fatal to the task.
    Parse,
    /// Caller aborted the attempt via the cancellation token.
    Cancelled,
}

impl FailureKind {
    /// Classify an error by inspecting its message, mirroring the coarse
    /// substring matching used for transport-level failures elsewhere in
    /// this codebase.
    #[must_use]
    pub fn classify(error: &anyhow::Error) -> Self {
        let msg = error.to_string().to_lowercase();

        if msg.contains("429") || msg.contains("too many requests") || msg.contains("rate limit") {
            return Self::RateLimited;
        }
        if msg.contains("cancelled") || msg.contains("canceled") {
            return Self::Cancelled;
        }
        if msg.contains("timeout")
            || msg.contains("timed out")
            || msg.contains("connection refused")
            || msg.contains("connection reset")
            || msg.contains("dns")
            || msg.contains("unreachable")
            || msg.contains("eof")
        {
            return Self::Retryable;
        }
        if msg.contains("parse") || msg.contains("xml") || msg.contains("selector") {
            return Self::Parse;
        }
        Self::Terminal
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Retryable | Self::RateLimited)
    }

    /// Base backoff multiplier applied to the task's retry delay.
    #[must_use]
    pub const fn delay_multiplier(self) -> f64 {
        match self {
            Self::RateLimited => 3.0,
            Self::Retryable => 1.0,
            Self::Terminal | Self::Parse | Self::Cancelled => 1.0,
        }
    }
}

/// Classify an HTTP status code into a `FailureKind`, independent of the
/// error-message heuristics in [`FailureKind::classify`].
#[must_use]
pub fn classify_status(status: u16) -> Option<FailureKind> {
    match status {
        200..=399 => None,
        408 | 429 | 500..=599 => Some(FailureKind::Retryable),
        _ => Some(FailureKind::Terminal),
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("task {0} is already terminal")]
    AlreadyTerminal(uuid::Uuid),
    #[error("job {0} not found")]
    JobNotFound(uuid::Uuid),
    #[error("invalid job transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: crate::domain::JobStatus,
        to: crate::domain::JobStatus,
    },
    #[error("store contention, retries exhausted")]
    ContentionExhausted,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("fetch timed out after {0}s")]
    Timeout(u64),
    #[error("external redirect to {0}")]
    ExternalRedirect(String),
    #[error("context cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("sitemap fetch timed out after {0}s")]
    Timeout(u64),
    #[error("sitemap xml parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("max sitemap recursion depth exceeded")]
    DepthExceeded,
}

/// Error surfaced at the HTTP boundary (§6 error envelope).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("job {0} not found")]
    NotFound(uuid::Uuid),
    #[error("store unavailable, retry later")]
    ServiceUnavailable,
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::ServiceUnavailable => 503,
            Self::RateLimitExceeded { .. } => 429,
            Self::Internal(_) => 500,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::JobNotFound(id) => Self::NotFound(id),
            StoreError::ContentionExhausted => Self::ServiceUnavailable,
            other => Self::Internal(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_before_network() {
        let err = anyhow::anyhow!("received 429 too many requests after timeout");
        assert_eq!(FailureKind::classify(&err), FailureKind::RateLimited);
    }

    #[test]
    fn classifies_network_errors_retryable() {
        let err = anyhow::anyhow!("connection reset by peer");
        assert!(FailureKind::classify(&err).is_retryable());
    }

    #[test]
    fn status_4xx_is_terminal_except_408_429() {
        assert_eq!(classify_status(404), Some(FailureKind::Terminal));
        assert_eq!(classify_status(408), Some(FailureKind::Retryable));
        assert_eq!(classify_status(429), Some(FailureKind::Retryable));
        assert_eq!(classify_status(200), None);
    }
}
