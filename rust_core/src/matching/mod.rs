//! Entity matching: similarity scoring and the commit/ambiguous/unmapped decision.
//!
//! The same [`decide`] rule is used by the batch builder and by the on-demand
//! lookup, so a name never resolves differently depending on which path saw it.

use crate::config::MatchThresholds;
use crate::types::{Candidate, Entity};
use serde::{Deserialize, Serialize};

pub mod builder;
pub mod scorer;

pub use builder::{BuildOutcome, MappingBuilder};
pub use scorer::{score, score_entities, CountryContext};

/// Float slack when comparing a margin against epsilon
const MARGIN_TOLERANCE: f64 = 1e-9;

/// Terminal state of matching one provider-A entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    /// Best candidate is confident and clearly ahead of the runner-up
    Confirmed(Candidate),
    /// Something plausible exists but is not safe to auto-commit; best first
    Ambiguous(Vec<Candidate>),
    /// Nothing reached the candidate threshold (or there were no candidates)
    Unmapped { best_score: Option<f64> },
}

impl Decision {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Decision::Confirmed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::Confirmed(_) => "confirmed",
            Decision::Ambiguous(_) => "ambiguous",
            Decision::Unmapped { .. } => "unmapped",
        }
    }
}

/// Score `a` against every candidate and sort best first.
///
/// Ties are broken on the candidate id so repeated runs rank identically.
pub fn rank_candidates<'a, I>(a: &Entity, candidates: I) -> Vec<Candidate>
where
    I: IntoIterator<Item = &'a Entity>,
{
    let mut ranked: Vec<Candidate> = candidates
        .into_iter()
        .filter(|b| b.kind == a.kind)
        .map(|b| Candidate::from_entity(b, score_entities(a, b)))
        .collect();
    ranked.sort_by(|x, y| {
        y.score
            .partial_cmp(&x.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| x.b_id.cmp(&y.b_id))
    });
    ranked
}

/// Apply the decision rule to an already ranked candidate list.
pub fn decide(ranked: &[Candidate], thresholds: &MatchThresholds) -> Decision {
    let Some(best) = ranked.first() else {
        return Decision::Unmapped { best_score: None };
    };

    if best.score < thresholds.min_candidate_threshold {
        return Decision::Unmapped {
            best_score: Some(best.score),
        };
    }

    let runner_up = ranked.get(1).map(|c| c.score).unwrap_or(0.0);
    let margin = best.score - runner_up;

    if best.score >= thresholds.confirm_threshold
        && margin + MARGIN_TOLERANCE >= thresholds.epsilon
    {
        return Decision::Confirmed(best.clone());
    }

    Decision::Ambiguous(top_k(ranked, thresholds.top_k))
}

/// Whether `b` may be scored against `a`: same kind, and same country when
/// both are known. A provider-B entity without a country stays eligible.
pub fn is_eligible(a: &Entity, b: &Entity) -> bool {
    if a.kind != b.kind {
        return false;
    }
    match (a.country.as_deref(), b.country.as_deref()) {
        (Some(ac), Some(bc)) => ac == bc,
        _ => true,
    }
}

/// Leading candidates attached to an ambiguous group, zero scores dropped.
pub fn top_k(ranked: &[Candidate], k: usize) -> Vec<Candidate> {
    ranked
        .iter()
        .filter(|c| c.score > 0.0)
        .take(k)
        .cloned()
        .collect()
}
