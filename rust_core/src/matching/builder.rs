//! Batch mapping builder.
//!
//! Scores every provider-A league and team against provider-B candidates in the
//! same country and partitions the results into confirmed, ambiguous and
//! unmapped. Scoring runs in parallel via rayon; output order follows the
//! input catalog so builds are reproducible.

use super::{decide, rank_candidates, top_k, Decision};
use crate::config::MatchThresholds;
use crate::discovery::ProviderCatalog;
use crate::types::{
    AmbiguousGroup, Candidate, Entity, EntityKind, MappingRecord, UnmappedEntity,
};
use chrono::Utc;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

/// Result of one build, partitioned by decision.
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    pub confirmed: Vec<MappingRecord>,
    pub ambiguous: Vec<AmbiguousGroup>,
    pub unmapped: Vec<UnmappedEntity>,
    pub total_a_entities: usize,
    /// Confirmations lost to a higher-confidence claim on the same B id
    pub conflicts_demoted: usize,
}

impl BuildOutcome {
    /// Every provider-A entity lands in exactly one partition.
    pub fn reconciles(&self) -> bool {
        self.confirmed.len() + self.ambiguous.len() + self.unmapped.len() == self.total_a_entities
    }

    pub fn confirmed_for(&self, a_id: &str) -> Option<&MappingRecord> {
        self.confirmed.iter().find(|r| r.a_id == a_id)
    }

    pub fn ambiguous_for(&self, a_id: &str) -> Option<&AmbiguousGroup> {
        self.ambiguous.iter().find(|g| g.entity.external_id == a_id)
    }

    pub fn unmapped_for(&self, a_id: &str) -> Option<&UnmappedEntity> {
        self.unmapped.iter().find(|u| u.entity.external_id == a_id)
    }
}

/// Provider-B entities bucketed for country-scoped candidate lookup.
struct CandidateIndex<'a> {
    by_country: FxHashMap<(EntityKind, String), Vec<&'a Entity>>,
    no_country: FxHashMap<EntityKind, Vec<&'a Entity>>,
    all: FxHashMap<EntityKind, Vec<&'a Entity>>,
}

impl<'a> CandidateIndex<'a> {
    fn new(b: &'a ProviderCatalog) -> Self {
        let mut index = Self {
            by_country: FxHashMap::default(),
            no_country: FxHashMap::default(),
            all: FxHashMap::default(),
        };
        for entity in b.entities() {
            index.all.entry(entity.kind).or_default().push(entity);
            match entity.country.as_deref() {
                Some(country) => index
                    .by_country
                    .entry((entity.kind, country.to_string()))
                    .or_default()
                    .push(entity),
                None => index.no_country.entry(entity.kind).or_default().push(entity),
            }
        }
        index
    }

    /// Same-country candidates (plus country-less ones) when `a` has a country,
    /// the full set of its kind otherwise.
    fn candidates_for(&self, a: &Entity) -> Vec<&'a Entity> {
        match a.country.as_deref() {
            Some(country) => {
                let mut out: Vec<&'a Entity> = self
                    .by_country
                    .get(&(a.kind, country.to_string()))
                    .cloned()
                    .unwrap_or_default();
                if let Some(unknown) = self.no_country.get(&a.kind) {
                    out.extend(unknown.iter().copied());
                }
                out
            }
            None => self.all.get(&a.kind).cloned().unwrap_or_default(),
        }
    }
}

/// One A entity with its ranked candidates and initial decision.
struct Scored<'a> {
    entity: &'a Entity,
    ranked: Vec<Candidate>,
    decision: Decision,
}

#[derive(Debug, Clone, Default)]
pub struct MappingBuilder {
    thresholds: MatchThresholds,
}

impl MappingBuilder {
    pub fn new(thresholds: MatchThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &MatchThresholds {
        &self.thresholds
    }

    /// Build mappings for every provider-A entity in `a` against catalog `b`.
    pub fn build(&self, a: &ProviderCatalog, b: &ProviderCatalog) -> BuildOutcome {
        let index = CandidateIndex::new(b);
        let a_entities: Vec<&Entity> = a.entities().collect();

        let mut scored: Vec<Scored<'_>> = a_entities
            .par_iter()
            .map(|entity| {
                let ranked = rank_candidates(entity, index.candidates_for(entity));
                let decision = decide(&ranked, &self.thresholds);
                Scored {
                    entity: *entity,
                    ranked,
                    decision,
                }
            })
            .collect();

        let conflicts_demoted = self.resolve_conflicts(&mut scored);

        let now = Utc::now();
        let mut outcome = BuildOutcome {
            total_a_entities: scored.len(),
            conflicts_demoted,
            ..Default::default()
        };

        for item in scored {
            debug!(
                "{} {} '{}' -> {}",
                item.entity.kind.as_str(),
                item.entity.external_id,
                item.entity.raw_name,
                item.decision.label()
            );
            match item.decision {
                Decision::Confirmed(best) => {
                    let b_entity = index
                        .all
                        .get(&item.entity.kind)
                        .and_then(|list| list.iter().find(|e| e.external_id == best.b_id));
                    let record = match b_entity {
                        Some(b) => MappingRecord::auto(item.entity, b, best.score),
                        None => {
                            let stand_in = Entity::new(
                                b.provider,
                                item.entity.kind,
                                best.b_id.clone(),
                                best.b_name.clone(),
                                best.country.as_deref(),
                            );
                            MappingRecord::auto(item.entity, &stand_in, best.score)
                        }
                    };
                    outcome.confirmed.push(record);
                }
                Decision::Ambiguous(candidates) => outcome.ambiguous.push(AmbiguousGroup {
                    entity: item.entity.clone(),
                    candidates,
                    recorded_at: now,
                }),
                Decision::Unmapped { best_score } => outcome.unmapped.push(UnmappedEntity {
                    entity: item.entity.clone(),
                    best_score,
                    recorded_at: now,
                }),
            }
        }

        info!(
            "Build complete: {} A entities -> {} confirmed, {} ambiguous, {} unmapped ({} conflicts demoted)",
            outcome.total_a_entities,
            outcome.confirmed.len(),
            outcome.ambiguous.len(),
            outcome.unmapped.len(),
            outcome.conflicts_demoted
        );

        outcome
    }

    /// Enforce one confirmation per B id: the highest confidence keeps it,
    /// everyone else (all parties on an exact tie) is demoted to ambiguous.
    fn resolve_conflicts(&self, scored: &mut [Scored<'_>]) -> usize {
        let mut claims: FxHashMap<(EntityKind, String), Vec<usize>> = FxHashMap::default();
        for (i, item) in scored.iter().enumerate() {
            if let Decision::Confirmed(best) = &item.decision {
                claims
                    .entry((item.entity.kind, best.b_id.clone()))
                    .or_default()
                    .push(i);
            }
        }

        let mut demoted = 0;
        for ((_, b_id), claimants) in claims {
            if claimants.len() < 2 {
                continue;
            }
            let confidences: Vec<(usize, f64)> = claimants
                .iter()
                .map(|&i| match &scored[i].decision {
                    Decision::Confirmed(c) => (i, c.score),
                    _ => (i, 0.0),
                })
                .collect();
            let top = confidences
                .iter()
                .map(|&(_, s)| s)
                .fold(f64::MIN, f64::max);
            let leaders = confidences.iter().filter(|&&(_, s)| s == top).count();

            for (i, confidence) in confidences {
                if leaders == 1 && confidence == top {
                    continue;
                }
                debug!(
                    "Demoting {} '{}': B id {} claimed with higher or equal confidence",
                    scored[i].entity.external_id, scored[i].entity.raw_name, b_id
                );
                let candidates = top_k(&scored[i].ranked, self.thresholds.top_k);
                scored[i].decision = Decision::Ambiguous(candidates);
                demoted += 1;
            }
        }
        demoted
    }
}
