//! Configuration constants and environment loading for the mapping engine.
//!
//! This module manages all runtime configuration:
//! - Match decision thresholds
//! - Per-provider endpoints, keys, and fetch pacing
//! - Retry, timeout, and sync scheduling
//! - Snapshot persistence path

use crate::error::{MappingError, Result};
use crate::utils::retry::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Minimum score for an automatic commit
pub const DEFAULT_CONFIRM_THRESHOLD: f64 = 0.85;

/// Required lead of the best candidate over the runner-up
pub const DEFAULT_EPSILON: f64 = 0.05;

/// Below this, a candidate is not worth recording at all
pub const DEFAULT_MIN_CANDIDATE_THRESHOLD: f64 = 0.6;

/// Candidates attached to an ambiguous group
pub const DEFAULT_TOP_K: usize = 3;

pub const DEFAULT_PROVIDER_A_URL: &str = "https://apiv2.allsportsapi.com/football/";
pub const DEFAULT_PROVIDER_B_URL: &str = "https://v3.football.api-sports.io";

pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_STORE_PATH: &str = "team_mappings.json";

/// Decision thresholds for the builder and the on-demand lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
    pub confirm_threshold: f64,
    pub epsilon: f64,
    pub min_candidate_threshold: f64,
    pub top_k: usize,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self {
            confirm_threshold: DEFAULT_CONFIRM_THRESHOLD,
            epsilon: DEFAULT_EPSILON,
            min_candidate_threshold: DEFAULT_MIN_CANDIDATE_THRESHOLD,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl MatchThresholds {
    /// Only the ordering between thresholds is load-bearing; exact values are tunable.
    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.confirm_threshold) || !in_unit(self.min_candidate_threshold) {
            return Err(MappingError::Config(
                "thresholds must lie in [0, 1]".to_string(),
            ));
        }
        if self.min_candidate_threshold > self.confirm_threshold {
            return Err(MappingError::Config(format!(
                "min_candidate_threshold ({}) exceeds confirm_threshold ({})",
                self.min_candidate_threshold, self.confirm_threshold
            )));
        }
        if !(0.0..1.0).contains(&self.epsilon) {
            return Err(MappingError::Config(format!(
                "epsilon ({}) must be in [0, 1)",
                self.epsilon
            )));
        }
        if self.top_k < 2 {
            return Err(MappingError::Config(
                "top_k must keep at least two candidates".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection and pacing settings for one provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    /// Minimum spacing between calls through the fetch gate
    pub min_delay: Duration,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub thresholds: MatchThresholds,
    pub provider_a: ProviderConfig,
    pub provider_b: ProviderConfig,
    pub retry: RetryPolicy,
    pub sync_interval: Duration,
    /// Only crawl leagues from these countries (normalized); empty = all
    pub country_filter: Vec<String>,
    /// Provider-B season used when listing league teams
    pub season: u16,
    /// Provider-A fixture window (days back from today) used to discover teams
    pub fixture_window_days: i64,
    pub store_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: MatchThresholds::default(),
            provider_a: ProviderConfig {
                base_url: DEFAULT_PROVIDER_A_URL.to_string(),
                api_key: String::new(),
                min_delay: Duration::from_millis(1000),
                request_timeout: Duration::from_secs(15),
            },
            provider_b: ProviderConfig {
                base_url: DEFAULT_PROVIDER_B_URL.to_string(),
                api_key: String::new(),
                min_delay: Duration::from_millis(6500), // ~10 req/min on the free tier
                request_timeout: Duration::from_secs(15),
            },
            retry: RetryPolicy::default(),
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            country_filter: Vec::new(),
            season: 2024,
            fixture_window_days: 180,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// API keys are required; everything else falls back to the defaults above.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let provider_a_key = env::var("PROVIDER_A_API_KEY")
            .map_err(|_| MappingError::Config("PROVIDER_A_API_KEY must be set".to_string()))?;
        let provider_b_key = env::var("PROVIDER_B_API_KEY")
            .map_err(|_| MappingError::Config("PROVIDER_B_API_KEY must be set".to_string()))?;

        let thresholds = MatchThresholds {
            confirm_threshold: env_parse("CONFIRM_THRESHOLD")
                .unwrap_or(defaults.thresholds.confirm_threshold),
            epsilon: env_parse("MATCH_EPSILON").unwrap_or(defaults.thresholds.epsilon),
            min_candidate_threshold: env_parse("MIN_CANDIDATE_THRESHOLD")
                .unwrap_or(defaults.thresholds.min_candidate_threshold),
            top_k: env_parse("AMBIGUOUS_TOP_K").unwrap_or(defaults.thresholds.top_k),
        };
        thresholds.validate()?;

        let provider_a = ProviderConfig {
            base_url: env::var("PROVIDER_A_URL").unwrap_or(defaults.provider_a.base_url),
            api_key: provider_a_key,
            min_delay: env_millis("PROVIDER_A_MIN_DELAY_MS")
                .unwrap_or(defaults.provider_a.min_delay),
            request_timeout: env_millis("PROVIDER_A_TIMEOUT_MS")
                .unwrap_or(defaults.provider_a.request_timeout),
        };
        let provider_b = ProviderConfig {
            base_url: env::var("PROVIDER_B_URL").unwrap_or(defaults.provider_b.base_url),
            api_key: provider_b_key,
            min_delay: env_millis("PROVIDER_B_MIN_DELAY_MS")
                .unwrap_or(defaults.provider_b.min_delay),
            request_timeout: env_millis("PROVIDER_B_TIMEOUT_MS")
                .unwrap_or(defaults.provider_b.request_timeout),
        };

        let retry = RetryPolicy {
            max_attempts: env_parse("FETCH_MAX_ATTEMPTS").unwrap_or(defaults.retry.max_attempts),
            base_backoff: env_millis("FETCH_BASE_BACKOFF_MS")
                .unwrap_or(defaults.retry.base_backoff),
            max_backoff: env_millis("FETCH_MAX_BACKOFF_MS").unwrap_or(defaults.retry.max_backoff),
        };

        let country_filter = env::var("SYNC_COUNTRIES")
            .map(|v| {
                v.split(',')
                    .filter_map(crate::utils::normalize::normalize_country)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            thresholds,
            provider_a,
            provider_b,
            retry,
            sync_interval: env_parse::<u64>("SYNC_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sync_interval),
            country_filter,
            season: env_parse("PROVIDER_B_SEASON").unwrap_or(defaults.season),
            fixture_window_days: env_parse("PROVIDER_A_FIXTURE_WINDOW_DAYS")
                .unwrap_or(defaults.fixture_window_days),
            store_path: env::var("MAPPING_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
        })
    }

    /// Whether leagues from `country` should be crawled.
    pub fn includes_country(&self, country: Option<&str>) -> bool {
        country_allowed(&self.country_filter, country)
    }
}

/// An empty filter allows everything; otherwise the country must be listed.
pub(crate) fn country_allowed(filter: &[String], country: Option<&str>) -> bool {
    if filter.is_empty() {
        return true;
    }
    match country {
        Some(c) => filter.iter().any(|f| f == c),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_are_valid() {
        assert!(MatchThresholds::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let t = MatchThresholds {
            confirm_threshold: 0.5,
            min_candidate_threshold: 0.7,
            ..Default::default()
        };
        assert!(matches!(t.validate(), Err(MappingError::Config(_))));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let t = MatchThresholds {
            confirm_threshold: 1.5,
            ..Default::default()
        };
        assert!(t.validate().is_err());

        let t = MatchThresholds {
            epsilon: -0.1,
            ..Default::default()
        };
        assert!(t.validate().is_err());

        let t = MatchThresholds {
            top_k: 1,
            ..Default::default()
        };
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_country_filter() {
        let mut config = EngineConfig::default();
        assert!(config.includes_country(None));
        assert!(config.includes_country(Some("spain")));

        config.country_filter = vec!["spain".to_string(), "italy".to_string()];
        assert!(config.includes_country(Some("italy")));
        assert!(!config.includes_country(Some("england")));
        assert!(!config.includes_country(None));
    }
}
