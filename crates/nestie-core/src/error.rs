//! Error type shared across the pipeline.
//!
//! External-service failures carry a [`ServiceErrorKind`] so the retry
//! policy can tell transient failures (rate limits, outages, timeouts)
//! from permanent ones (bad request, bad credentials).

use std::fmt;

use thiserror::Error;

/// Classification of a failed call to an external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Network failure or 5xx response.
    ServiceUnavailable,
    /// HTTP 429.
    RateLimited,
    /// The call exceeded its deadline.
    Timeout,
    /// The service answered, but not in the expected shape.
    MalformedResponse,
    /// 4xx other than 408/429. Retrying will not help.
    Rejected,
}

impl ServiceErrorKind {
    /// Map a non-success HTTP status to a kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ServiceErrorKind::RateLimited,
            408 => ServiceErrorKind::Timeout,
            500..=599 => ServiceErrorKind::ServiceUnavailable,
            _ => ServiceErrorKind::Rejected,
        }
    }

    pub fn is_transient(self) -> bool {
        !matches!(self, ServiceErrorKind::Rejected)
    }
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceErrorKind::ServiceUnavailable => "service unavailable",
            ServiceErrorKind::RateLimited => "rate limited",
            ServiceErrorKind::Timeout => "timeout",
            ServiceErrorKind::MalformedResponse => "malformed response",
            ServiceErrorKind::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to ingest '{document}': {reason}")]
    Ingestion { document: String, reason: String },

    #[error("embedding service error ({kind}): {message}")]
    Embedding {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("language model service error ({kind}): {message}")]
    LanguageModel {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("chat platform error ({kind}): {message}")]
    Platform {
        kind: ServiceErrorKind,
        message: String,
    },

    #[error("vector index error: {0}")]
    VectorIndex(String),

    #[error("vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn embedding(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Error::Embedding {
            kind,
            message: message.into(),
        }
    }

    pub fn language_model(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Error::LanguageModel {
            kind,
            message: message.into(),
        }
    }

    pub fn platform(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Error::Platform {
            kind,
            message: message.into(),
        }
    }

    pub fn ingestion(document: impl Into<String>, reason: impl fmt::Display) -> Self {
        Error::Ingestion {
            document: document.into(),
            reason: reason.to_string(),
        }
    }

    /// The service kind, for errors that came from an external call.
    pub fn service_kind(&self) -> Option<ServiceErrorKind> {
        match self {
            Error::Embedding { kind, .. }
            | Error::LanguageModel { kind, .. }
            | Error::Platform { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether retrying the failed operation could succeed.
    pub fn is_transient(&self) -> bool {
        self.service_kind().is_some_and(ServiceErrorKind::is_transient)
    }
}
