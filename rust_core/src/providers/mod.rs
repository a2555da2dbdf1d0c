//! Provider catalog abstractions.
//!
//! Defines the `CatalogSource` trait that the discovery crawler pulls leagues
//! and teams through, plus the per-provider parse adapters that turn raw JSON
//! into [`Entity`] values:
//! - `provider_a`: query-parameter API (`met=Leagues`, `met=Fixtures`)
//! - `provider_b`: header-keyed REST API (`/leagues`, `/teams`)
//!
//! Field-name guessing lives in the adapters only. A record the adapter cannot
//! make sense of comes back as [`ParseResult::Invalid`] and is counted, never
//! fatal.

use crate::error::Result;
use crate::types::{Entity, Provider};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub mod provider_a;
pub mod provider_b;

/// Outcome of parsing one provider record.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult<T> {
    Ok(T),
    Invalid(String),
}

impl<T> ParseResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, ParseResult::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            ParseResult::Ok(value) => Some(value),
            ParseResult::Invalid(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParseResult<U> {
        match self {
            ParseResult::Ok(value) => ParseResult::Ok(f(value)),
            ParseResult::Invalid(reason) => ParseResult::Invalid(reason),
        }
    }
}

/// Split parsed records into the valid ones and the rejection reasons.
pub fn partition<T>(items: Vec<ParseResult<T>>) -> (Vec<T>, Vec<String>) {
    let mut valid = Vec::with_capacity(items.len());
    let mut invalid = Vec::new();
    for item in items {
        match item {
            ParseResult::Ok(value) => valid.push(value),
            ParseResult::Invalid(reason) => invalid.push(reason),
        }
    }
    (valid, invalid)
}

/// One page of a paginated listing. Unpaginated endpoints report `1/1`.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<ParseResult<T>>,
    pub current: u32,
    pub total: u32,
}

impl<T> Page<T> {
    pub fn single(items: Vec<ParseResult<T>>) -> Self {
        Self {
            items,
            current: 1,
            total: 1,
        }
    }

    pub fn has_more(&self) -> bool {
        self.current < self.total
    }
}

/// A provider's league and team catalog.
///
/// Implementations perform exactly one HTTP call per method invocation; pacing,
/// retries and timeouts are applied by the crawler around each call.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    fn provider(&self) -> Provider;

    /// Minimum spacing between calls to this provider
    fn min_delay(&self) -> Duration;

    /// Upper bound on a single call
    fn request_timeout(&self) -> Duration;

    /// List leagues, 1-based `page`
    async fn fetch_leagues(&self, page: u32) -> Result<Page<Entity>>;

    /// List the teams of `league`, 1-based `page`
    async fn fetch_teams(&self, league: &Entity, page: u32) -> Result<Page<Entity>>;

    /// Free-text team search. Providers without a search endpoint return nothing.
    async fn search_teams(&self, name: &str) -> Result<Vec<ParseResult<Entity>>>;
}

/// First non-empty string among `keys`; numeric ids are stringified.
pub(crate) fn field_str(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match &item[*key] {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_str_fallbacks() {
        let item = json!({"team_key": 81, "team_name": "", "name": "Barcelona"});
        assert_eq!(field_str(&item, &["team_id", "team_key"]), Some("81".to_string()));
        assert_eq!(
            field_str(&item, &["team_name", "name"]),
            Some("Barcelona".to_string())
        );
        assert_eq!(field_str(&item, &["missing"]), None);
    }

    #[test]
    fn test_partition_counts_invalid() {
        let items = vec![
            ParseResult::Ok(1),
            ParseResult::Invalid("no id".to_string()),
            ParseResult::Ok(3),
        ];
        let (valid, invalid) = partition(items);
        assert_eq!(valid, vec![1, 3]);
        assert_eq!(invalid.len(), 1);
    }

    #[test]
    fn test_page_has_more() {
        let page: Page<Entity> = Page {
            items: Vec::new(),
            current: 1,
            total: 3,
        };
        assert!(page.has_more());
        assert!(!Page::<Entity>::single(Vec::new()).has_more());
    }
}
