//! Similarity scoring between two normalized names.
//!
//! score = 1.0 on exact match, otherwise
//!         0.5 * token-set Jaccard + 0.5 * normalized Levenshtein similarity,
//! then adjusted by country context.

use crate::types::Entity;
use crate::utils::normalize::tokens;
use std::collections::HashSet;
use strsim::normalized_levenshtein;

const TOKEN_WEIGHT: f64 = 0.5;
const EDIT_WEIGHT: f64 = 0.5;

/// Added when both sides report the same country
pub const SAME_COUNTRY_BONUS: f64 = 0.05;

/// Subtracted when both sides report different countries ("Inter" vs "Inter Miami")
pub const CROSS_COUNTRY_PENALTY: f64 = 0.2;

/// Country relationship between the two entities being scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountryContext {
    /// At least one side has no country
    #[default]
    Unknown,
    Same,
    Different,
}

impl CountryContext {
    pub fn between(a: Option<&str>, b: Option<&str>) -> Self {
        match (a, b) {
            (Some(a), Some(b)) if a == b => CountryContext::Same,
            (Some(_), Some(_)) => CountryContext::Different,
            _ => CountryContext::Unknown,
        }
    }

    pub fn of(a: &Entity, b: &Entity) -> Self {
        Self::between(a.country.as_deref(), b.country.as_deref())
    }
}

/// Jaccard overlap of the whitespace token sets.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let a_tokens: HashSet<&str> = tokens(a).into_iter().collect();
    let b_tokens: HashSet<&str> = tokens(b).into_iter().collect();
    if a_tokens.is_empty() && b_tokens.is_empty() {
        return 0.0;
    }
    let intersection = a_tokens.intersection(&b_tokens).count();
    let union = a_tokens.union(&b_tokens).count();
    intersection as f64 / union as f64
}

/// Name-only similarity. Symmetric: `name_similarity(a, b) == name_similarity(b, a)`.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    TOKEN_WEIGHT * token_overlap(a, b) + EDIT_WEIGHT * normalized_levenshtein(a, b)
}

/// Score two normalized names under a country context, clamped to [0, 1].
pub fn score(a: &str, b: &str, context: CountryContext) -> f64 {
    let base = name_similarity(a, b);
    if base == 0.0 {
        return 0.0;
    }
    let adjusted = match context {
        CountryContext::Same => base + SAME_COUNTRY_BONUS,
        CountryContext::Different => base - CROSS_COUNTRY_PENALTY,
        CountryContext::Unknown => base,
    };
    adjusted.clamp(0.0, 1.0)
}

/// Score two entities using their own normalized names and countries.
pub fn score_entities(a: &Entity, b: &Entity) -> f64 {
    score(&a.normalized_name, &b.normalized_name, CountryContext::of(a, b))
}
