//! In-process catalog sources for engine-level tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use teammap_rust_core::utils::retry::RetryPolicy;
use teammap_rust_core::{
    CatalogSource, EngineConfig, Entity, MappingError, Page, ParseResult, Provider, Result,
};

pub struct FakeSource {
    provider: Provider,
    leagues: Mutex<Vec<Entity>>,
    teams: Mutex<HashMap<String, Vec<Entity>>>,
    search_results: Mutex<Vec<Entity>>,
    fail_leagues: AtomicBool,
    fail_teams_for: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    pub league_calls: AtomicUsize,
    pub team_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            leagues: Mutex::new(Vec::new()),
            teams: Mutex::new(HashMap::new()),
            search_results: Mutex::new(Vec::new()),
            fail_leagues: AtomicBool::new(false),
            fail_teams_for: Mutex::new(HashSet::new()),
            delay: Mutex::new(Duration::ZERO),
            league_calls: AtomicUsize::new(0),
            team_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }

    pub fn add_league(&self, id: &str, name: &str, country: &str) {
        self.leagues
            .lock()
            .push(Entity::league(self.provider, id, name, Some(country)));
    }

    pub fn add_team(&self, league_id: &str, id: &str, name: &str, country: &str) {
        self.teams
            .lock()
            .entry(league_id.to_string())
            .or_default()
            .push(Entity::team(self.provider, id, name, Some(country)));
    }

    pub fn remove_team(&self, league_id: &str, id: &str) {
        if let Some(teams) = self.teams.lock().get_mut(league_id) {
            teams.retain(|t| t.external_id != id);
        }
    }

    pub fn set_search_results(&self, results: Vec<Entity>) {
        *self.search_results.lock() = results;
    }

    pub fn fail_leagues(&self, fail: bool) {
        self.fail_leagues.store(fail, Ordering::SeqCst);
    }

    pub fn fail_teams_for(&self, league_id: &str) {
        self.fail_teams_for.lock().insert(league_id.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.league_calls.load(Ordering::SeqCst)
            + self.team_calls.load(Ordering::SeqCst)
            + self.search_calls.load(Ordering::SeqCst)
    }

    fn outage(&self) -> MappingError {
        MappingError::unavailable(self.provider, "HTTP 503")
    }
}

#[async_trait]
impl CatalogSource for FakeSource {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn min_delay(&self) -> Duration {
        Duration::ZERO
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn fetch_leagues(&self, _page: u32) -> Result<Page<Entity>> {
        self.league_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_leagues.load(Ordering::SeqCst) {
            return Err(self.outage());
        }
        let items = self.leagues.lock().iter().cloned().map(ParseResult::Ok).collect();
        Ok(Page::single(items))
    }

    async fn fetch_teams(&self, league: &Entity, _page: u32) -> Result<Page<Entity>> {
        self.team_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_teams_for.lock().contains(&league.external_id) {
            return Err(self.outage());
        }
        let items = self
            .teams
            .lock()
            .get(&league.external_id)
            .map(|teams| teams.iter().cloned().map(ParseResult::Ok).collect())
            .unwrap_or_default();
        Ok(Page::single(items))
    }

    async fn search_teams(&self, _name: &str) -> Result<Vec<ParseResult<Entity>>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .search_results
            .lock()
            .iter()
            .cloned()
            .map(ParseResult::Ok)
            .collect())
    }
}

/// Fast retries, no pacing, snapshot under `dir`.
pub fn test_config(dir: &Path) -> EngineConfig {
    EngineConfig {
        retry: RetryPolicy {
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        store_path: dir.join("mappings.json"),
        ..Default::default()
    }
}

/// An English top flight as both providers see it.
///
/// - league 152 / 39 and team Arsenal match exactly
/// - "Manchester" sits between City and United
/// - "Brighton" has no provider-B counterpart yet
pub fn premier_league() -> (FakeSource, FakeSource) {
    let a = FakeSource::new(Provider::A);
    a.add_league("152", "Premier League", "England");
    a.add_team("152", "141", "Arsenal", "England");
    a.add_team("152", "3086", "Manchester", "England");
    a.add_team("152", "3079", "Brighton", "England");

    let b = FakeSource::new(Provider::B);
    b.add_league("39", "Premier League", "England");
    b.add_league("40", "Championship", "England");
    b.add_team("39", "42", "Arsenal", "England");
    b.add_team("39", "50", "Manchester City", "England");
    b.add_team("39", "33", "Manchester United", "England");
    (a, b)
}
