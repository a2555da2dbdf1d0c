//! Discovery crawler: pulls league and team catalogs from both providers.
//!
//! Every provider call goes through the shared [`FetchGate`] (one key per
//! provider), is bounded by the provider's request timeout, and is retried with
//! exponential backoff. The two providers are crawled concurrently.
//!
//! Failure scoping:
//! - League listing exhausted its retries: that provider's catalog fails
//! - One league's teams exhausted their retries: the league is flagged stale,
//!   the rest of the catalog is kept
//! - Malformed records: skipped and counted

use crate::config::country_allowed;
use crate::error::Result;
use crate::fetch_gate::FetchGate;
use crate::providers::{partition, CatalogSource, Page, ParseResult};
use crate::types::{Entity, EntityKind, Provider, StaleScope};
use crate::utils::retry::{execute_with_retry, with_timeout, RetryPolicy};
use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hard stop for a provider that keeps reporting more pages
const MAX_PAGES: u32 = 100;

/// Everything one provider reported during one sync.
#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    pub provider: Provider,
    pub leagues: Vec<Entity>,
    pub teams: Vec<Entity>,
    /// Leagues (or the whole provider) whose data is incomplete
    pub stale: Vec<StaleScope>,
    pub malformed_skipped: usize,
    pub fetched_at: DateTime<Utc>,
    seen: FxHashSet<(EntityKind, String)>,
}

impl ProviderCatalog {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            leagues: Vec::new(),
            teams: Vec::new(),
            stale: Vec::new(),
            malformed_skipped: 0,
            fetched_at: Utc::now(),
            seen: FxHashSet::default(),
        }
    }

    /// Add a league; duplicates by id are ignored. Returns whether it was new.
    pub fn push_league(&mut self, league: Entity) -> bool {
        if self.seen.insert((EntityKind::League, league.external_id.clone())) {
            self.leagues.push(league);
            true
        } else {
            false
        }
    }

    /// Add a team; a team seen under an earlier league keeps that league.
    pub fn push_team(&mut self, team: Entity) -> bool {
        if self.seen.insert((EntityKind::Team, team.external_id.clone())) {
            self.teams.push(team);
            true
        } else {
            false
        }
    }

    /// Leagues first, then teams, in discovery order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.leagues.iter().chain(self.teams.iter())
    }

    pub fn entity_count(&self) -> usize {
        self.leagues.len() + self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }

    pub fn mark_stale(&mut self, league: Option<&Entity>, reason: impl Into<String>) {
        self.stale.push(StaleScope {
            provider: self.provider,
            league_id: league.map(|l| l.external_id.clone()),
            country: league.and_then(|l| l.country.clone()),
            reason: reason.into(),
        });
    }

    /// Placeholder for a provider whose crawl failed outright.
    pub fn unavailable(provider: Provider, reason: impl Into<String>) -> Self {
        let mut catalog = Self::new(provider);
        catalog.mark_stale(None, reason);
        catalog
    }
}

/// Result of crawling both providers; each side fails independently.
#[derive(Debug)]
pub struct Discovery {
    pub a: Result<ProviderCatalog>,
    pub b: Result<ProviderCatalog>,
}

pub struct DiscoveryCrawler {
    a: Arc<dyn CatalogSource>,
    b: Arc<dyn CatalogSource>,
    gate: Arc<FetchGate>,
    retry: RetryPolicy,
    /// Normalized countries to crawl; empty = all
    country_filter: Vec<String>,
}

impl std::fmt::Debug for DiscoveryCrawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryCrawler")
            .field("retry", &self.retry)
            .field("country_filter", &self.country_filter)
            .finish()
    }
}

impl DiscoveryCrawler {
    pub fn new(
        a: Arc<dyn CatalogSource>,
        b: Arc<dyn CatalogSource>,
        gate: Arc<FetchGate>,
        retry: RetryPolicy,
        country_filter: Vec<String>,
    ) -> Self {
        Self {
            a,
            b,
            gate,
            retry,
            country_filter,
        }
    }

    pub fn gate(&self) -> &Arc<FetchGate> {
        &self.gate
    }

    /// Crawl both providers concurrently.
    pub async fn discover_catalogs(&self) -> Discovery {
        let (a, b) = tokio::join!(self.crawl(self.a.as_ref()), self.crawl(self.b.as_ref()));
        Discovery { a, b }
    }

    /// Crawl one provider: leagues, then the teams of every kept league.
    pub async fn crawl(&self, source: &dyn CatalogSource) -> Result<ProviderCatalog> {
        let provider = source.provider();
        let mut catalog = ProviderCatalog::new(provider);

        let leagues = self
            .collect_pages(source, "leagues", |page| source.fetch_leagues(page))
            .await
            .into_result()
            .map_err(|e| {
                warn!("{} league listing failed: {}", provider, e);
                e
            })?;

        let mut filtered_out = 0;
        for item in leagues.items {
            match item {
                ParseResult::Ok(league) => {
                    if self.includes_country(league.country.as_deref()) {
                        catalog.push_league(league);
                    } else {
                        filtered_out += 1;
                    }
                }
                ParseResult::Invalid(reason) => {
                    debug!("{} skipped league: {}", provider, reason);
                    catalog.malformed_skipped += 1;
                }
            }
        }
        debug!(
            "{}: {} leagues kept, {} outside the country filter",
            provider,
            catalog.leagues.len(),
            filtered_out
        );

        let leagues = catalog.leagues.clone();
        for league in &leagues {
            let label = format!("teams of league {}", league.external_id);
            let collected = self
                .collect_pages(source, &label, |page| source.fetch_teams(league, page))
                .await;

            if let Some(err) = &collected.error {
                warn!(
                    "{} league {} ('{}') incomplete: {}",
                    provider, league.external_id, league.raw_name, err
                );
                catalog.mark_stale(Some(league), err.to_string());
            }

            let (teams, invalid) = partition(collected.items);
            catalog.malformed_skipped += invalid.len();
            for team in teams {
                let team = match team.league_id {
                    Some(_) => team,
                    None => team.with_league(league.external_id.clone()),
                };
                catalog.push_team(team);
            }
        }

        catalog.fetched_at = Utc::now();
        info!(
            "{} catalog: {} leagues, {} teams, {} stale scopes, {} malformed records skipped",
            provider,
            catalog.leagues.len(),
            catalog.teams.len(),
            catalog.stale.len(),
            catalog.malformed_skipped
        );
        Ok(catalog)
    }

    /// Teams of one provider-B league, all pages. Used by the on-demand lookup.
    pub async fn fetch_b_league_teams(&self, league: &Entity) -> Result<Vec<Entity>> {
        let source = self.b.as_ref();
        let label = format!("teams of league {}", league.external_id);
        let collected = self
            .collect_pages(source, &label, |page| source.fetch_teams(league, page))
            .await;
        if let Some(err) = collected.error {
            return Err(err);
        }
        Ok(partition(collected.items).0)
    }

    /// Provider-B name search. Used by the on-demand lookup.
    pub async fn search_b_teams(&self, name: &str) -> Result<Vec<Entity>> {
        let source = self.b.as_ref();
        let items = self
            .call(source, "team search", || source.search_teams(name))
            .await?;
        Ok(partition(items).0)
    }

    fn includes_country(&self, country: Option<&str>) -> bool {
        country_allowed(&self.country_filter, country)
    }

    /// One provider call: gate, timeout, retry.
    async fn call<T, F, Fut>(&self, source: &dyn CatalogSource, what: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let provider = source.provider();
        let min_delay = source.min_delay();
        let timeout = source.request_timeout();
        let label = format!("{} {}", provider, what);
        execute_with_retry(&label, self.retry, || {
            let fut = f();
            self.gate
                .execute(provider.as_str(), min_delay, move || with_timeout(provider, timeout, fut))
        })
        .await
    }

    /// Walk pages until the provider reports the last one. Items from pages
    /// fetched before a failure are kept alongside the error.
    async fn collect_pages<F, Fut>(
        &self,
        source: &dyn CatalogSource,
        what: &str,
        mut fetch: F,
    ) -> Collected
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Page<Entity>>>,
    {
        let mut collected = Collected::default();
        let mut page = 1;
        loop {
            let label = format!("{} page {}", what, page);
            match self.call(source, &label, || fetch(page)).await {
                Ok(result) => {
                    let more = result.has_more();
                    collected.items.extend(result.items);
                    if !more {
                        break;
                    }
                    if page >= MAX_PAGES {
                        warn!(
                            "{} {}: stopping after {} pages",
                            source.provider(),
                            what,
                            MAX_PAGES
                        );
                        break;
                    }
                    page += 1;
                }
                Err(e) => {
                    collected.error = Some(e);
                    break;
                }
            }
        }
        collected
    }
}

#[derive(Default)]
struct Collected {
    items: Vec<ParseResult<Entity>>,
    error: Option<crate::error::MappingError>,
}

impl Collected {
    fn into_result(self) -> Result<Page<Entity>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(Page::single(self.items)),
        }
    }
}
