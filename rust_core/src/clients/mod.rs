//! HTTP clients for the two data providers.
//!
//! Both implement [`crate::providers::CatalogSource`]; response bodies are
//! handed to the matching parse adapter in `crate::providers`.

pub mod provider_a;
pub mod provider_b;

pub use provider_a::ProviderAClient;
pub use provider_b::ProviderBClient;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{MappingError, Result};
use crate::types::Provider;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

pub(crate) fn breaker(provider: Provider) -> Arc<CircuitBreaker> {
    Arc::new(CircuitBreaker::new(provider, CircuitBreakerConfig::default()))
}

fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map an HTTP status to the error taxonomy. `None` means success.
fn classify_status(provider: Provider, status: StatusCode, retry_after: Option<&str>) -> Option<MappingError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => MappingError::RateLimited {
            provider,
            retry_after: parse_retry_after(retry_after),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            MappingError::Config(format!("{} rejected the API key ({})", provider, status))
        }
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            MappingError::unavailable(provider, format!("HTTP {}", s))
        }
        s => MappingError::malformed(provider, format!("HTTP {}", s)),
    })
}

/// Send a request behind the provider's circuit breaker and decode the JSON body.
pub(crate) async fn send_json(
    provider: Provider,
    breaker: &CircuitBreaker,
    request: RequestBuilder,
) -> Result<Value> {
    breaker.guard()?;
    let result = send_inner(provider, request).await;
    breaker.record(&result);
    result
}

async fn send_inner(provider: Provider, request: RequestBuilder) -> Result<Value> {
    let resp = request
        .send()
        .await
        .map_err(|e| MappingError::unavailable(provider, e.to_string()))?;

    let status = resp.status();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok());
    if let Some(err) = classify_status(provider, status, retry_after) {
        debug!("{} request failed: {}", provider, err);
        return Err(err);
    }

    resp.json::<Value>()
        .await
        .map_err(|e| MappingError::malformed(provider, format!("invalid JSON body: {}", e)))
}
