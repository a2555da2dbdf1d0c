//! Error taxonomy for the mapping engine.
//!
//! "No mapping found" and "ambiguous mapping" are deliberately absent: they are
//! expected terminal states and are modelled as [`crate::matching::Decision`]
//! variants or `None`, never as errors.

use crate::types::Provider;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MappingError>;

#[derive(Debug, Error)]
pub enum MappingError {
    /// Network failure, timeout, 5xx, or an open circuit breaker.
    #[error("{provider} unavailable: {reason}")]
    UpstreamUnavailable { provider: Provider, reason: String },

    /// Provider-reported throttling (HTTP 429 or an in-body quota error).
    #[error("{provider} rate limited (retry after {retry_after:?})")]
    RateLimited {
        provider: Provider,
        retry_after: Option<Duration>,
    },

    /// Payload did not have the expected shape.
    #[error("{provider} returned malformed data: {reason}")]
    MalformedResponse { provider: Provider, reason: String },

    #[error("both providers failed: a={a}; b={b}")]
    BothProvidersFailed {
        a: Box<MappingError>,
        b: Box<MappingError>,
    },

    #[error("refusing to commit: {0}")]
    EmptyCatalog(String),

    #[error("store persistence failed: {0}")]
    Persistence(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MappingError {
    pub fn unavailable(provider: Provider, reason: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            provider,
            reason: reason.into(),
        }
    }

    pub fn malformed(provider: Provider, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider,
            reason: reason.into(),
        }
    }

    /// Whether the crawler should retry the call that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::RateLimited { .. }
        )
    }

    /// Provider-supplied backoff hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<std::io::Error> for MappingError {
    fn from(e: std::io::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for MappingError {
    fn from(e: serde_json::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
