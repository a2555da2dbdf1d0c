//! Immutable mapping snapshot and the pure functions that derive the next one.
//!
//! Every provider-A entity the store knows about sits in exactly one of three
//! sets: confirmed `records`, `ambiguous`, or `unmapped`. Superseded record
//! versions go to the append-only `history`.

use crate::discovery::ProviderCatalog;
use crate::matching::BuildOutcome;
use crate::types::{
    AmbiguousGroup, Candidate, Entity, EntityKind, MappingRecord, MappingSource, Provider,
    StaleScope, SupersedeReason, SupersededRecord, SyncStats, UnmappedEntity,
};
use crate::utils::normalize::normalize;
use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

/// Confidence changes smaller than this are not a new version
const CONFIDENCE_EPSILON: f64 = 1e-9;

/// `(kind, provider id)`; league and team id spaces overlap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    fn of_entity(entity: &Entity) -> Self {
        Self::new(entity.kind, entity.external_id.clone())
    }

    fn of_a(record: &MappingRecord) -> Self {
        Self::new(record.kind, record.a_id.clone())
    }

    fn of_b(record: &MappingRecord) -> Self {
        Self::new(record.kind, record.b_id.clone())
    }
}

/// What an upsert did.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Inserted,
    /// Replaced the active version; the old one went to history
    Updated,
    /// Same mapping seen again; only `last_seen_at` moved
    Refreshed,
    /// Auto write against a verified record; only `last_seen_at` moved
    Protected,
    /// The B id is held by a pinned or more confident record
    Rejected { held_by: String },
}

#[derive(Debug, Clone, Default)]
struct SnapshotIndex {
    by_a_id: FxHashMap<EntityKey, usize>,
    by_b_id: FxHashMap<EntityKey, Vec<usize>>,
    by_a_name: FxHashMap<(EntityKind, String), Vec<usize>>,
    by_b_name: FxHashMap<(EntityKind, String), Vec<usize>>,
    ambiguous_by_name: FxHashMap<(EntityKind, String), usize>,
    unmapped_by_name: FxHashMap<(EntityKind, String), usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingSnapshot {
    pub records: Vec<MappingRecord>,
    pub ambiguous: Vec<AmbiguousGroup>,
    pub unmapped: Vec<UnmappedEntity>,
    pub history: Vec<SupersededRecord>,
    /// Provider-B catalog of the last sync that reached provider B
    #[serde(default)]
    pub provider_b_entities: Vec<EntityKey>,
    #[serde(default)]
    pub stale_scopes: Vec<StaleScope>,
    #[serde(default)]
    pub malformed_skipped: usize,
    #[serde(default)]
    pub conflicts_demoted: usize,
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(skip)]
    index: SnapshotIndex,
}

fn name_key(kind: EntityKind, name: &str) -> (EntityKind, String) {
    (kind, normalize(name))
}

/// Pinned first, then most confident, then lowest id.
fn best_of<'a>(records: &'a [MappingRecord], idx: &[usize]) -> Option<&'a MappingRecord> {
    idx.iter().map(|&i| &records[i]).max_by(|x, y| {
        x.verified
            .cmp(&y.verified)
            .then(
                x.confidence
                    .partial_cmp(&y.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then_with(|| y.a_id.cmp(&x.a_id))
    })
}

fn supersede(record: MappingRecord, reason: SupersedeReason, now: DateTime<Utc>) -> SupersededRecord {
    SupersededRecord {
        record,
        superseded_at: now,
        reason,
    }
}

/// A record that lost its B id becomes an ambiguous group holding that B id
/// as its only candidate.
fn demoted_group(record: &MappingRecord, now: DateTime<Utc>) -> AmbiguousGroup {
    AmbiguousGroup {
        entity: Entity::new(
            Provider::A,
            record.kind,
            record.a_id.clone(),
            record.a_name.clone(),
            record.country.as_deref(),
        ),
        candidates: vec![Candidate {
            b_id: record.b_id.clone(),
            b_name: record.b_name.clone(),
            country: record.country.clone(),
            score: record.confidence,
        }],
        recorded_at: now,
    }
}

/// Whether a provider-B stale scope covers records in `country`.
fn covered_by(stale: &[StaleScope], country: Option<&str>) -> bool {
    stale.iter().filter(|s| s.provider == Provider::B).any(|s| {
        (s.league_id.is_none() && s.country.is_none()) || s.country.as_deref() == country
    })
}

impl MappingSnapshot {
    /// Rebuild the lookup indexes. Called after every mutation and after load.
    pub(crate) fn reindex(&mut self) {
        let mut index = SnapshotIndex::default();
        for (i, r) in self.records.iter().enumerate() {
            index.by_a_id.insert(EntityKey::of_a(r), i);
            index.by_b_id.entry(EntityKey::of_b(r)).or_default().push(i);
            index.by_a_name.entry(name_key(r.kind, &r.a_name)).or_default().push(i);
            index.by_b_name.entry(name_key(r.kind, &r.b_name)).or_default().push(i);
        }
        for (i, g) in self.ambiguous.iter().enumerate() {
            index
                .ambiguous_by_name
                .entry((g.entity.kind, g.entity.normalized_name.clone()))
                .or_insert(i);
        }
        for (i, u) in self.unmapped.iter().enumerate() {
            index
                .unmapped_by_name
                .entry((u.entity.kind, u.entity.normalized_name.clone()))
                .or_insert(i);
        }
        self.index = index;
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn record_for(&self, kind: EntityKind, a_id: &str) -> Option<&MappingRecord> {
        self.index
            .by_a_id
            .get(&EntityKey::new(kind, a_id))
            .map(|&i| &self.records[i])
    }

    pub fn holders_of(&self, kind: EntityKind, b_id: &str) -> Vec<&MappingRecord> {
        self.index
            .by_b_id
            .get(&EntityKey::new(kind, b_id))
            .map(|idx| idx.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }

    /// Confirmed team mapping for a provider-A team name.
    pub fn get_by_provider_a_name(&self, name: &str) -> Option<&MappingRecord> {
        let idx = self.index.by_a_name.get(&name_key(EntityKind::Team, name))?;
        best_of(&self.records, idx)
    }

    /// Confirmed team mapping for a provider-B team name.
    pub fn get_by_provider_b_name(&self, name: &str) -> Option<&MappingRecord> {
        let idx = self.index.by_b_name.get(&name_key(EntityKind::Team, name))?;
        best_of(&self.records, idx)
    }

    pub fn ambiguous_by_name(&self, kind: EntityKind, name: &str) -> Option<&AmbiguousGroup> {
        self.index
            .ambiguous_by_name
            .get(&name_key(kind, name))
            .map(|&i| &self.ambiguous[i])
    }

    pub fn unmapped_by_name(&self, kind: EntityKind, name: &str) -> Option<&UnmappedEntity> {
        self.index
            .unmapped_by_name
            .get(&name_key(kind, name))
            .map(|&i| &self.unmapped[i])
    }

    /// Confirmed league mapping for a provider-A league id.
    pub fn league_for_a_id(&self, a_league_id: &str) -> Option<&MappingRecord> {
        self.record_for(EntityKind::League, a_league_id)
    }

    /// Superseded versions for one A entity, oldest first.
    pub fn history_for(&self, kind: EntityKind, a_id: &str) -> Vec<&SupersededRecord> {
        self.history
            .iter()
            .filter(|h| h.record.kind == kind && h.record.a_id == a_id)
            .collect()
    }

    pub fn stats(&self) -> SyncStats {
        let confirmed = self.records.len();
        let ambiguous = self.ambiguous.len();
        let unmapped = self.unmapped.len();

        let claimed: FxHashSet<EntityKey> = self.records.iter().map(EntityKey::of_b).collect();
        let provider_b_only = self
            .provider_b_entities
            .iter()
            .filter(|k| !claimed.contains(*k))
            .count();

        let average_confidence = if confirmed == 0 {
            0.0
        } else {
            self.records.iter().map(|r| r.confidence).sum::<f64>() / confirmed as f64
        };

        let countries: FxHashSet<&str> = self
            .records
            .iter()
            .filter_map(|r| r.country.as_deref())
            .collect();

        SyncStats {
            total_mappings: confirmed + ambiguous + unmapped,
            confirmed,
            ambiguous,
            unmapped,
            both_apis_mapped: confirmed,
            provider_a_only: ambiguous + unmapped,
            provider_b_only,
            average_confidence,
            countries_covered: countries.len(),
            stale_scopes: self.stale_scopes.clone(),
            malformed_skipped: self.malformed_skipped,
            conflicts_demoted: self.conflicts_demoted,
        }
    }

    /// Every A entity appears in exactly one of the three sets.
    pub fn reconciles(&self) -> bool {
        let mut seen: FxHashSet<EntityKey> = FxHashSet::default();
        self.records.iter().all(|r| seen.insert(EntityKey::of_a(r)))
            && self
                .ambiguous
                .iter()
                .all(|g| seen.insert(EntityKey::of_entity(&g.entity)))
            && self
                .unmapped
                .iter()
                .all(|u| seen.insert(EntityKey::of_entity(&u.entity)))
    }

    // ------------------------------------------------------------------
    // Single-record writes
    // ------------------------------------------------------------------

    pub(crate) fn apply_upsert(&mut self, mut record: MappingRecord, now: DateTime<Utc>) -> UpsertOutcome {
        let key = EntityKey::of_a(&record);

        if let Some(&i) = self.index.by_a_id.get(&key) {
            if self.records[i].verified && record.source == MappingSource::Auto && !record.verified {
                self.records[i].last_seen_at = now;
                return UpsertOutcome::Protected;
            }
        }

        if record.is_pinned() || record.source == MappingSource::Manual {
            // Operator-authoritative: other pinned holders may share the B id, auto ones may not
            self.demote_auto_holders(&record, now);
        } else {
            let holders: Vec<usize> = self
                .index
                .by_b_id
                .get(&EntityKey::of_b(&record))
                .map(|idx| {
                    idx.iter()
                        .copied()
                        .filter(|&j| self.records[j].a_id != record.a_id)
                        .collect()
                })
                .unwrap_or_default();

            if let Some(&j) = holders.iter().find(|&&j| {
                let h = &self.records[j];
                h.verified || h.source == MappingSource::Manual || h.confidence >= record.confidence
            }) {
                return UpsertOutcome::Rejected {
                    held_by: self.records[j].a_id.clone(),
                };
            }

            // Only weaker auto holders remain: the new claim takes the B id
            self.demote(holders, now);
        }

        record.last_seen_at = now;
        let outcome = match self
            .records
            .iter()
            .position(|r| r.kind == record.kind && r.a_id == record.a_id)
        {
            Some(i) => {
                let current = &self.records[i];
                let unchanged = current.b_id == record.b_id
                    && (current.confidence - record.confidence).abs() < CONFIDENCE_EPSILON
                    && current.source == record.source
                    && current.verified == record.verified;
                if unchanged {
                    self.records[i].last_seen_at = now;
                    UpsertOutcome::Refreshed
                } else {
                    if current.b_id == record.b_id {
                        record.created_at = current.created_at;
                    }
                    let old = std::mem::replace(&mut self.records[i], record);
                    self.history
                        .push(supersede(old, SupersedeReason::Replaced, now));
                    UpsertOutcome::Updated
                }
            }
            None => {
                self.ambiguous
                    .retain(|g| EntityKey::of_entity(&g.entity) != key);
                self.unmapped
                    .retain(|u| EntityKey::of_entity(&u.entity) != key);
                self.records.push(record);
                UpsertOutcome::Inserted
            }
        };

        self.reindex();
        outcome
    }

    /// Move every unpinned auto record holding `pinned`'s B id to ambiguous.
    fn demote_auto_holders(&mut self, pinned: &MappingRecord, now: DateTime<Utc>) {
        let losers: Vec<usize> = self
            .index
            .by_b_id
            .get(&EntityKey::of_b(pinned))
            .map(|idx| {
                idx.iter()
                    .copied()
                    .filter(|&j| {
                        let h = &self.records[j];
                        h.a_id != pinned.a_id && !h.verified && h.source == MappingSource::Auto
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.demote(losers, now);
    }

    /// Move the records at `idx` to ambiguous with a `LostConflict` history entry.
    /// Leaves the index stale; callers reindex.
    fn demote(&mut self, mut idx: Vec<usize>, now: DateTime<Utc>) {
        idx.sort_unstable_by(|x, y| y.cmp(x));
        for j in idx {
            let loser = self.records.remove(j);
            self.ambiguous.push(demoted_group(&loser, now));
            self.history
                .push(supersede(loser, SupersedeReason::LostConflict, now));
            self.conflicts_demoted += 1;
        }
    }

    /// Pin an existing record. Returns the pinned record, `None` if absent.
    pub(crate) fn apply_verify(
        &mut self,
        kind: EntityKind,
        a_id: &str,
        now: DateTime<Utc>,
    ) -> Option<MappingRecord> {
        let i = *self.index.by_a_id.get(&EntityKey::new(kind, a_id))?;
        if !self.records[i].verified {
            let old = self.records[i].clone();
            self.history
                .push(supersede(old, SupersedeReason::Verified, now));
            self.records[i].verified = true;
        }
        Some(self.records[i].clone())
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    /// Derive the snapshot that results from merging one build into this one.
    ///
    /// - Verified records survive unchanged (`last_seen_at` refreshed if seen)
    /// - Records for entities absent from this run are kept as they are
    /// - An auto record that did not re-confirm is superseded, unless its
    ///   country is covered by a provider-B stale scope, in which case it is kept
    /// - A new confirmation whose B id is pinned elsewhere is demoted to ambiguous
    pub fn apply_build(
        &self,
        outcome: &BuildOutcome,
        a: &ProviderCatalog,
        b: &ProviderCatalog,
        now: DateTime<Utc>,
    ) -> MappingSnapshot {
        let built: FxHashSet<EntityKey> = a.entities().map(EntityKey::of_entity).collect();
        let mut history = self.history.clone();
        let mut records: Vec<MappingRecord> = Vec::new();
        let mut ambiguous: Vec<AmbiguousGroup> = Vec::new();
        let mut unmapped: Vec<UnmappedEntity> = Vec::new();
        let mut demoted = outcome.conflicts_demoted;

        let mut previous_auto: FxHashMap<EntityKey, &MappingRecord> = FxHashMap::default();
        for rec in &self.records {
            let key = EntityKey::of_a(rec);
            if rec.verified {
                let mut pinned = rec.clone();
                if built.contains(&key) {
                    pinned.last_seen_at = now;
                }
                records.push(pinned);
            } else if !built.contains(&key) {
                records.push(rec.clone());
            } else {
                previous_auto.insert(key, rec);
            }
        }
        let carried: FxHashSet<EntityKey> = records.iter().map(EntityKey::of_a).collect();

        for g in &self.ambiguous {
            let key = EntityKey::of_entity(&g.entity);
            if !built.contains(&key) && !carried.contains(&key) {
                ambiguous.push(g.clone());
            }
        }
        for u in &self.unmapped {
            let key = EntityKey::of_entity(&u.entity);
            if !built.contains(&key) && !carried.contains(&key) {
                unmapped.push(u.clone());
            }
        }

        // Non-confirmed outcomes; remember them in case a kept record is displaced later
        let mut outcome_ambiguous: FxHashMap<EntityKey, &AmbiguousGroup> = FxHashMap::default();
        let mut outcome_unmapped: FxHashMap<EntityKey, &UnmappedEntity> = FxHashMap::default();
        let mut kept_stale: FxHashSet<EntityKey> = FxHashSet::default();

        let previous_groups: FxHashMap<EntityKey, &AmbiguousGroup> = self
            .ambiguous
            .iter()
            .map(|g| (EntityKey::of_entity(&g.entity), g))
            .collect();

        for g in &outcome.ambiguous {
            let key = EntityKey::of_entity(&g.entity);
            if carried.contains(&key) {
                continue;
            }
            if let Some(prev) = previous_auto.get(&key) {
                if covered_by(&b.stale, prev.country.as_deref()) {
                    records.push((*prev).clone());
                    outcome_ambiguous.insert(key.clone(), g);
                    kept_stale.insert(key);
                    continue;
                }
                history.push(supersede((*prev).clone(), SupersedeReason::NoLongerMatched, now));
            }
            ambiguous.push(g.clone());
        }
        for u in &outcome.unmapped {
            let key = EntityKey::of_entity(&u.entity);
            if carried.contains(&key) {
                continue;
            }
            if let Some(prev) = previous_auto.get(&key) {
                if covered_by(&b.stale, prev.country.as_deref()) {
                    records.push((*prev).clone());
                    outcome_unmapped.insert(key.clone(), u);
                    kept_stale.insert(key);
                    continue;
                }
                history.push(supersede((*prev).clone(), SupersedeReason::NoLongerMatched, now));
            } else if let Some(group) = previous_groups.get(&key) {
                // Candidates went missing with provider B; keep the open review
                if covered_by(&b.stale, u.entity.country.as_deref()) {
                    ambiguous.push((*group).clone());
                    continue;
                }
            }
            unmapped.push(u.clone());
        }

        let a_entities: FxHashMap<EntityKey, &Entity> = a
            .entities()
            .map(|e| (EntityKey::of_entity(e), e))
            .collect();

        for rec in &outcome.confirmed {
            let key = EntityKey::of_a(rec);
            if carried.contains(&key) {
                continue;
            }

            if let Some(h) = records
                .iter()
                .position(|r| r.kind == rec.kind && r.b_id == rec.b_id)
            {
                let holder = &records[h];
                if holder.verified || holder.source == MappingSource::Manual {
                    // The pinned mapping wins; the claimant waits for review
                    demoted += 1;
                    let mut group = demoted_group(rec, now);
                    if let Some(entity) = a_entities.get(&key) {
                        group.entity = (*entity).clone();
                    }
                    if let Some(prev) = previous_auto.get(&key) {
                        history.push(supersede((*prev).clone(), SupersedeReason::LostConflict, now));
                    }
                    ambiguous.push(group);
                    continue;
                }

                // Fresh evidence beats a record kept from an earlier run
                let displaced = records.remove(h);
                let displaced_key = EntityKey::of_a(&displaced);
                demoted += 1;
                if kept_stale.contains(&displaced_key) {
                    if let Some(g) = outcome_ambiguous.get(&displaced_key) {
                        ambiguous.push((*g).clone());
                    } else if let Some(u) = outcome_unmapped.get(&displaced_key) {
                        unmapped.push((*u).clone());
                    }
                } else {
                    ambiguous.push(demoted_group(&displaced, now));
                }
                history.push(supersede(displaced, SupersedeReason::LostConflict, now));
            }

            let mut fresh = rec.clone();
            fresh.last_seen_at = now;
            if let Some(prev) = previous_auto.get(&key) {
                if prev.b_id == fresh.b_id {
                    fresh.created_at = prev.created_at;
                    if (prev.confidence - fresh.confidence).abs() >= CONFIDENCE_EPSILON {
                        history.push(supersede((*prev).clone(), SupersedeReason::Replaced, now));
                    }
                } else {
                    history.push(supersede((*prev).clone(), SupersedeReason::Replaced, now));
                }
            }
            records.push(fresh);
        }

        let provider_b_entities = if b.is_empty() {
            self.provider_b_entities.clone()
        } else {
            b.entities().map(EntityKey::of_entity).collect()
        };

        let mut next = MappingSnapshot {
            records,
            ambiguous,
            unmapped,
            history,
            provider_b_entities,
            stale_scopes: a.stale.iter().chain(b.stale.iter()).cloned().collect(),
            malformed_skipped: a.malformed_skipped + b.malformed_skipped,
            conflicts_demoted: demoted,
            last_sync: Some(now),
            index: SnapshotIndex::default(),
        };
        next.reindex();
        next
    }
}
