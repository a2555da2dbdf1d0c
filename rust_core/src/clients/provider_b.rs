use super::{breaker, http_client, send_json};
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::providers::{provider_b, CatalogSource, Page, ParseResult};
use crate::types::{Entity, Provider};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shortest query the `/teams?search=` endpoint accepts
const MIN_SEARCH_LEN: usize = 3;

/// Provider B: REST endpoints keyed by the `x-apisports-key` header.
#[derive(Clone)]
pub struct ProviderBClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    min_delay: Duration,
    request_timeout: Duration,
    season: u16,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for ProviderBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBClient")
            .field("base_url", &self.base_url)
            .field("season", &self.season)
            .field("circuit_breaker_state", &self.circuit_breaker.state())
            .finish()
    }
}

impl ProviderBClient {
    pub fn new(config: &ProviderConfig, season: u16) -> Self {
        Self {
            client: http_client(config.request_timeout),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            min_delay: config.min_delay,
            request_timeout: config.request_timeout,
            season,
            circuit_breaker: breaker(Provider::B),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    async fn call(&self, path: &str, mut params: Vec<(&str, String)>, page: u32) -> Result<serde_json::Value> {
        // Endpoints without paging reject an explicit `page`
        if page > 1 {
            params.push(("page", page.to_string()));
        }
        let request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("x-apisports-key", &self.api_key)
            .query(&params);
        send_json(Provider::B, &self.circuit_breaker, request).await
    }
}

#[async_trait]
impl CatalogSource for ProviderBClient {
    fn provider(&self) -> Provider {
        Provider::B
    }

    fn min_delay(&self) -> Duration {
        self.min_delay
    }

    fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn fetch_leagues(&self, page: u32) -> Result<Page<Entity>> {
        let body = self
            .call("/leagues", vec![("season", self.season.to_string())], page)
            .await?;
        provider_b::parse_leagues(&body)
    }

    async fn fetch_teams(&self, league: &Entity, page: u32) -> Result<Page<Entity>> {
        let body = self
            .call(
                "/teams",
                vec![
                    ("league", league.external_id.clone()),
                    ("season", self.season.to_string()),
                ],
                page,
            )
            .await?;
        provider_b::parse_teams(&body, Some(&league.external_id))
    }

    async fn search_teams(&self, name: &str) -> Result<Vec<ParseResult<Entity>>> {
        // The endpoint only accepts letters, digits and spaces
        let query: String = name
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if query.chars().count() < MIN_SEARCH_LEN {
            debug!("Skipping provider_b search for short query '{}'", name);
            return Ok(Vec::new());
        }
        let body = self.call("/teams", vec![("search", query)], 1).await?;
        Ok(provider_b::parse_teams(&body, None)?.items)
    }
}
