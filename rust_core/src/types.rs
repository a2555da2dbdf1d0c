//! Core data model shared by the crawler, builder, store and lookup service.

use crate::utils::normalize::{normalize, normalize_country};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Data provider identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Query-parameter driven provider (`met=...`), source of the names callers ask about
    A,
    /// Header-keyed REST provider, sole source of corner/card statistics
    B,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::A => "provider_a",
            Provider::B => "provider_b",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Team,
    League,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Team => "team",
            EntityKind::League => "league",
        }
    }
}

/// One team or league as seen by one provider during one sync.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub provider: Provider,
    pub external_id: String,
    pub raw_name: String,
    pub normalized_name: String,
    /// Normalized country, `None` when the provider did not report one
    pub country: Option<String>,
    pub kind: EntityKind,
    /// League the team was discovered under (teams only)
    pub league_id: Option<String>,
}

impl Entity {
    pub fn new(
        provider: Provider,
        kind: EntityKind,
        external_id: impl Into<String>,
        raw_name: impl Into<String>,
        country: Option<&str>,
    ) -> Self {
        let raw_name = raw_name.into();
        Self {
            provider,
            external_id: external_id.into(),
            normalized_name: normalize(&raw_name),
            raw_name,
            country: country.and_then(normalize_country),
            kind,
            league_id: None,
        }
    }

    pub fn team(
        provider: Provider,
        external_id: impl Into<String>,
        raw_name: impl Into<String>,
        country: Option<&str>,
    ) -> Self {
        Self::new(provider, EntityKind::Team, external_id, raw_name, country)
    }

    pub fn league(
        provider: Provider,
        external_id: impl Into<String>,
        raw_name: impl Into<String>,
        country: Option<&str>,
    ) -> Self {
        Self::new(provider, EntityKind::League, external_id, raw_name, country)
    }

    pub fn with_league(mut self, league_id: impl Into<String>) -> Self {
        self.league_id = Some(league_id.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    Auto,
    Manual,
}

/// A committed correspondence between a provider-A entity and a provider-B entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub kind: EntityKind,
    pub a_id: String,
    pub a_name: String,
    pub b_id: String,
    pub b_name: String,
    pub confidence: f64,
    pub verified: bool,
    pub source: MappingSource,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl MappingRecord {
    /// Build an automatically discovered record from a scored pair.
    pub fn auto(a: &Entity, b: &Entity, confidence: f64) -> Self {
        let now = Utc::now();
        Self {
            kind: a.kind,
            a_id: a.external_id.clone(),
            a_name: a.raw_name.clone(),
            b_id: b.external_id.clone(),
            b_name: b.raw_name.clone(),
            confidence: confidence.clamp(0.0, 1.0),
            verified: false,
            source: MappingSource::Auto,
            country: a.country.clone().or_else(|| b.country.clone()),
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Build an operator-entered record. Manual records are verified on creation.
    pub fn manual(
        kind: EntityKind,
        a_id: impl Into<String>,
        a_name: impl Into<String>,
        b_id: impl Into<String>,
        b_name: impl Into<String>,
        country: Option<&str>,
    ) -> Self {
        let now = Utc::now();
        Self {
            kind,
            a_id: a_id.into(),
            a_name: a_name.into(),
            b_id: b_id.into(),
            b_name: b_name.into(),
            confidence: 1.0,
            verified: true,
            source: MappingSource::Manual,
            country: country.and_then(normalize_country),
            created_at: now,
            last_seen_at: now,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.verified
    }
}

/// Why a record version left the active set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupersedeReason {
    /// A newer version for the same A id replaced it
    Replaced,
    /// A higher-confidence claim took its B id
    LostConflict,
    /// A later sync no longer found a confident match
    NoLongerMatched,
    /// An operator pinned it; this is the unpinned version
    Verified,
}

/// An inactive record version, kept so confidence drift stays auditable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupersededRecord {
    pub record: MappingRecord,
    pub superseded_at: DateTime<Utc>,
    pub reason: SupersedeReason,
}

/// A scored provider-B candidate for some provider-A entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub b_id: String,
    pub b_name: String,
    pub country: Option<String>,
    pub score: f64,
}

impl Candidate {
    pub fn from_entity(b: &Entity, score: f64) -> Self {
        Self {
            b_id: b.external_id.clone(),
            b_name: b.raw_name.clone(),
            country: b.country.clone(),
            score,
        }
    }
}

/// A provider-A entity whose best candidates are too close to call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmbiguousGroup {
    pub entity: Entity,
    /// Top-K candidates, best first
    pub candidates: Vec<Candidate>,
    pub recorded_at: DateTime<Utc>,
}

/// A provider-A entity with no candidate worth keeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnmappedEntity {
    pub entity: Entity,
    /// Best score seen, if any candidate existed at all
    pub best_score: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// A country or league whose provider data was incomplete in the last sync.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaleScope {
    pub provider: Provider,
    pub league_id: Option<String>,
    pub country: Option<String>,
    pub reason: String,
}

/// Derived counters; never stored independently of the sets they count.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_mappings: usize,
    pub confirmed: usize,
    pub ambiguous: usize,
    pub unmapped: usize,
    pub both_apis_mapped: usize,
    pub provider_a_only: usize,
    pub provider_b_only: usize,
    pub average_confidence: f64,
    pub countries_covered: usize,
    pub stale_scopes: Vec<StaleScope>,
    pub malformed_skipped: usize,
    pub conflicts_demoted: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub stats: SyncStats,
}

/// What the statistics subsystem receives for a resolved name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MappedTeam {
    pub external_id: String,
    pub canonical_name: String,
    pub confidence: f64,
}
