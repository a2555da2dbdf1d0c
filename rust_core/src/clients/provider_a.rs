use super::{breaker, http_client, send_json};
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::providers::{provider_a, CatalogSource, Page, ParseResult};
use crate::types::{Entity, Provider};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Provider A: one endpoint, everything selected through `met=`.
///
/// It has no team listing per league that reliably covers lower divisions, so
/// teams are discovered from the league's fixtures over a trailing window.
#[derive(Clone)]
pub struct ProviderAClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    min_delay: Duration,
    request_timeout: Duration,
    fixture_window_days: i64,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl std::fmt::Debug for ProviderAClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAClient")
            .field("base_url", &self.base_url)
            .field("circuit_breaker_state", &self.circuit_breaker.state())
            .finish()
    }
}

impl ProviderAClient {
    pub fn new(config: &ProviderConfig, fixture_window_days: i64) -> Self {
        Self {
            client: http_client(config.request_timeout),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            min_delay: config.min_delay,
            request_timeout: config.request_timeout,
            fixture_window_days,
            circuit_breaker: breaker(Provider::A),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    async fn call(&self, met: &str, params: &[(&str, String)]) -> Result<serde_json::Value> {
        let request = self
            .client
            .get(&self.base_url)
            .query(&[("met", met), ("APIkey", self.api_key.as_str())])
            .query(params);
        send_json(Provider::A, &self.circuit_breaker, request).await
    }
}

#[async_trait]
impl CatalogSource for ProviderAClient {
    fn provider(&self) -> Provider {
        Provider::A
    }

    fn min_delay(&self) -> Duration {
        self.min_delay
    }

    fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn fetch_leagues(&self, _page: u32) -> Result<Page<Entity>> {
        let body = self.call("Leagues", &[]).await?;
        let items = provider_a::parse_envelope(&body)?
            .iter()
            .map(provider_a::parse_league)
            .collect();
        Ok(Page::single(items))
    }

    async fn fetch_teams(&self, league: &Entity, _page: u32) -> Result<Page<Entity>> {
        let today = Utc::now().date_naive();
        let from = today - ChronoDuration::days(self.fixture_window_days);
        let body = self
            .call(
                "Fixtures",
                &[
                    ("leagueId", league.external_id.clone()),
                    ("from", from.format("%Y-%m-%d").to_string()),
                    ("to", today.format("%Y-%m-%d").to_string()),
                ],
            )
            .await?;
        let items = provider_a::parse_envelope(&body)?
            .iter()
            .flat_map(|fixture| provider_a::parse_fixture_teams(fixture, league))
            .collect();
        Ok(Page::single(items))
    }

    /// Provider A exposes no team search.
    async fn search_teams(&self, _name: &str) -> Result<Vec<ParseResult<Entity>>> {
        Ok(Vec::new())
    }
}
