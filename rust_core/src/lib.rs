//! Teammap Core - cross-provider football team and league identity mapping.
//!
//! This crate provides:
//! - Name normalization and similarity scoring for team/league names
//! - A rate-limited, retrying discovery crawler over two data providers
//! - A batch mapping builder (confirmed / ambiguous / unmapped)
//! - A snapshot-swapped mapping store with JSON persistence
//! - On-demand name resolution with zero-fallback semantics
//! - A periodic sync scheduler
//!
//! [`MappingEngine`] owns all of the above; callers normally only need
//! [`MappingEngine::resolve`] and [`MappingEngine::get_sync_status`].

pub mod circuit_breaker;
pub mod clients;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod fetch_gate;
pub mod lookup;
pub mod matching;
pub mod providers;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod utils;

pub use config::{EngineConfig, MatchThresholds, ProviderConfig};
pub use discovery::{DiscoveryCrawler, ProviderCatalog};
pub use engine::MappingEngine;
pub use error::{MappingError, Result};
pub use fetch_gate::FetchGate;
pub use lookup::LookupService;
pub use matching::{BuildOutcome, Decision, MappingBuilder};
pub use providers::{CatalogSource, Page, ParseResult};
pub use scheduler::{SyncOutcome, SyncReport, SyncScheduler};
pub use store::{MappingSnapshot, MappingStore, UpsertOutcome};
pub use types::*;
pub use utils::normalize::normalize;
