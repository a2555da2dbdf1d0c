//! Name resolution for the statistics subsystem.
//!
//! A store hit answers immediately. On a miss the service runs a scoped
//! on-demand match against provider B:
//! - an unmapped team whose league is mapped is scored against that league's
//!   provider-B teams
//! - anything else falls back to a provider-B name search
//!
//! Only a confirmed decision produces a result. Ambiguous entities, failed
//! fetches and weak matches all return `None`; no fuzzy or partial-prefix
//! fallback exists.
//!
//! Search hits for names the store has never seen have no provider-A id to key
//! a record on; they are kept in a bounded in-memory cache instead.

use crate::config::MatchThresholds;
use crate::discovery::DiscoveryCrawler;
use crate::error::Result;
use crate::matching::{decide, is_eligible, rank_candidates, Decision};
use crate::store::{MappingStore, UpsertOutcome};
use crate::types::{Entity, EntityKind, MappedTeam, MappingRecord, Provider, SyncStatus};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl From<&MappingRecord> for MappedTeam {
    fn from(record: &MappingRecord) -> Self {
        Self {
            external_id: record.b_id.clone(),
            canonical_name: record.b_name.clone(),
            confidence: record.confidence,
        }
    }
}

/// Entries kept for unknown-name search hits before the cache starts over
const SEARCH_CACHE_CAPACITY: usize = 1024;

#[derive(Debug)]
pub struct LookupService {
    store: Arc<MappingStore>,
    crawler: Arc<DiscoveryCrawler>,
    thresholds: MatchThresholds,
    /// normalized name -> confirmed provider-B search hit
    search_hits: RwLock<FxHashMap<String, MappedTeam>>,
}

impl LookupService {
    pub fn new(
        store: Arc<MappingStore>,
        crawler: Arc<DiscoveryCrawler>,
        thresholds: MatchThresholds,
    ) -> Self {
        Self {
            store,
            crawler,
            thresholds,
            search_hits: RwLock::new(FxHashMap::default()),
        }
    }

    /// Provider-B team for a provider-A team name, or `None`.
    pub async fn resolve(&self, name: &str) -> Option<MappedTeam> {
        if let Some(record) = self.store.get_by_provider_a_name(name) {
            return Some(MappedTeam::from(&record));
        }

        let snapshot = self.store.snapshot();
        if let Some(group) = snapshot.ambiguous_by_name(EntityKind::Team, name) {
            debug!(
                "'{}' is ambiguous between {} candidates; not resolving",
                name,
                group.candidates.len()
            );
            return None;
        }

        let unmapped = snapshot
            .unmapped_by_name(EntityKind::Team, name)
            .map(|u| u.entity.clone());
        drop(snapshot);

        match unmapped {
            Some(entity) => self.match_known(entity).await,
            None => self.match_unknown(name).await,
        }
    }

    /// Provider-A team for a provider-B team name. Store only.
    pub fn reverse_resolve(&self, name: &str) -> Option<MappedTeam> {
        self.store
            .get_by_provider_b_name(name)
            .map(|record| MappedTeam {
                external_id: record.a_id,
                canonical_name: record.a_name,
                confidence: record.confidence,
            })
    }

    pub fn get_sync_status(&self) -> SyncStatus {
        self.store.sync_status()
    }

    /// On-demand match for a team the store already lists as unmapped.
    /// A confirmed result is written back as an auto record.
    async fn match_known(&self, entity: Entity) -> Option<MappedTeam> {
        let candidates = match self.scoped_candidates(&entity).await {
            Ok(c) => c,
            Err(e) => {
                warn!("On-demand lookup for '{}' failed: {}", entity.raw_name, e);
                return None;
            }
        };

        let (b, score) = self.confirm(&entity, &candidates)?;
        let record = MappingRecord::auto(&entity, b, score);
        let pending = record.clone();
        match self.store.write_blocking(move |s| s.upsert(pending)).await {
            Ok(UpsertOutcome::Rejected { held_by }) => {
                debug!(
                    "'{}' matched {} but that id belongs to A id {}",
                    entity.raw_name, record.b_id, held_by
                );
                None
            }
            Ok(_) => {
                info!(
                    "Resolved '{}' on demand -> {} '{}' ({:.3})",
                    entity.raw_name, record.b_id, record.b_name, record.confidence
                );
                Some(MappedTeam::from(&record))
            }
            Err(e) => {
                warn!("Could not persist on-demand mapping for '{}': {}", entity.raw_name, e);
                Some(MappedTeam::from(&record))
            }
        }
    }

    /// On-demand match for a name the store has never seen. Without a
    /// provider-A id there is nothing to write back, so hits go to the search cache.
    async fn match_unknown(&self, name: &str) -> Option<MappedTeam> {
        let entity = Entity::team(Provider::A, String::new(), name, None);
        if entity.normalized_name.is_empty() {
            return None;
        }

        let cached = self.search_hits.read().get(&entity.normalized_name).cloned();
        if let Some(hit) = cached {
            if self.is_claimed(&hit.external_id) {
                self.search_hits.write().remove(&entity.normalized_name);
                return None;
            }
            return Some(hit);
        }

        let candidates = match self.crawler.search_b_teams(name).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Provider B search for '{}' failed: {}", name, e);
                return None;
            }
        };
        let (b, score) = self.confirm(&entity, &candidates)?;
        if self.is_claimed(&b.external_id) {
            debug!("'{}' matched {} which is already mapped elsewhere", name, b.external_id);
            return None;
        }
        let hit = MappedTeam {
            external_id: b.external_id.clone(),
            canonical_name: b.raw_name.clone(),
            confidence: score,
        };

        let mut hits = self.search_hits.write();
        if hits.len() >= SEARCH_CACHE_CAPACITY {
            hits.clear();
        }
        hits.insert(entity.normalized_name, hit.clone());
        Some(hit)
    }

    /// Whether a confirmed record already holds this provider-B team id.
    fn is_claimed(&self, b_id: &str) -> bool {
        !self
            .store
            .snapshot()
            .holders_of(EntityKind::Team, b_id)
            .is_empty()
    }

    /// The mapped league's provider-B teams when the league is known,
    /// a provider-B name search otherwise.
    async fn scoped_candidates(&self, entity: &Entity) -> Result<Vec<Entity>> {
        let league = entity
            .league_id
            .as_deref()
            .and_then(|id| self.store.league_for_a_id(id));
        match league {
            Some(league) => {
                debug!(
                    "Scoping '{}' to provider B league {} ('{}')",
                    entity.raw_name, league.b_id, league.b_name
                );
                let b_league = Entity::league(
                    Provider::B,
                    league.b_id,
                    league.b_name,
                    league.country.as_deref(),
                );
                self.crawler.fetch_b_league_teams(&b_league).await
            }
            None => self.crawler.search_b_teams(&entity.raw_name).await,
        }
    }

    /// Apply the builder's decision rule to eligible candidates.
    fn confirm<'a>(&self, entity: &Entity, candidates: &'a [Entity]) -> Option<(&'a Entity, f64)> {
        let eligible: Vec<&Entity> = candidates.iter().filter(|b| is_eligible(entity, b)).collect();
        let ranked = rank_candidates(entity, eligible.iter().copied());
        match decide(&ranked, &self.thresholds) {
            Decision::Confirmed(best) => candidates
                .iter()
                .find(|b| b.external_id == best.b_id)
                .map(|b| (b, best.score)),
            other => {
                debug!("On-demand match for '{}' is {}", entity.raw_name, other.label());
                None
            }
        }
    }
}
