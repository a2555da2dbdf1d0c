//! Periodic sync: discovery, build, store swap.
//!
//! A sync either commits a complete new snapshot or leaves the previous one in
//! place. It aborts without committing when:
//! - both providers failed
//! - provider A produced no entities (there is nothing to map)
//! - the store could not persist the new snapshot
//!
//! A provider-B failure alone does not abort: the build runs against an empty
//! provider-B catalog flagged stale, and existing records in stale scopes are
//! kept.

use crate::discovery::{DiscoveryCrawler, ProviderCatalog};
use crate::error::{MappingError, Result};
use crate::matching::MappingBuilder;
use crate::store::MappingStore;
use crate::types::{Provider, SyncStats};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Summary of one committed sync.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub sync_id: Uuid,
    pub stats: SyncStats,
    pub provider_a_entities: usize,
    pub provider_b_entities: usize,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another sync holds the lock; nothing was done
    AlreadyRunning,
}

#[derive(Debug)]
pub struct SyncScheduler {
    crawler: Arc<DiscoveryCrawler>,
    builder: MappingBuilder,
    store: Arc<MappingStore>,
    interval: Duration,
    running: AsyncMutex<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl SyncScheduler {
    pub fn new(
        crawler: Arc<DiscoveryCrawler>,
        builder: MappingBuilder,
        store: Arc<MappingStore>,
        interval: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            crawler,
            builder,
            store,
            interval,
            running: AsyncMutex::new(()),
            shutdown_tx,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Run one sync now unless one is already in progress.
    ///
    /// On error the committed snapshot is unchanged and the failure is
    /// recorded in the sync status.
    pub async fn trigger_now(&self) -> Result<SyncOutcome> {
        let Ok(_guard) = self.running.try_lock() else {
            info!("Sync already running; trigger ignored");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        let sync_id = Uuid::new_v4();
        match self.sync(sync_id).await {
            Ok(report) => Ok(SyncOutcome::Completed(report)),
            Err(e) => {
                error!("Sync {} failed: {}", sync_id, e);
                self.store.record_sync_failure(e.to_string());
                Err(e)
            }
        }
    }

    async fn sync(&self, sync_id: Uuid) -> Result<SyncReport> {
        let started = Instant::now();
        info!("Sync {} started", sync_id);

        let discovery = self.crawler.discover_catalogs().await;
        let (a, b) = match (discovery.a, discovery.b) {
            (Err(ea), Err(eb)) => {
                return Err(MappingError::BothProvidersFailed {
                    a: Box::new(ea),
                    b: Box::new(eb),
                })
            }
            (Err(ea), Ok(_)) => {
                return Err(MappingError::EmptyCatalog(format!(
                    "{} catalog unavailable: {}",
                    Provider::A,
                    ea
                )))
            }
            (Ok(a), b) => (a, b),
        };

        if a.is_empty() {
            return Err(MappingError::EmptyCatalog(format!(
                "{} returned no leagues or teams",
                Provider::A
            )));
        }

        let b = match b {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => {
                warn!("{} returned an empty catalog; keeping its mappings", Provider::B);
                ProviderCatalog::unavailable(Provider::B, "empty catalog")
            }
            Err(e) => {
                warn!("{} unavailable; keeping its mappings: {}", Provider::B, e);
                ProviderCatalog::unavailable(Provider::B, e.to_string())
            }
        };

        let outcome = self.builder.build(&a, &b);
        let staged = self.store.stage_build(&outcome, &a, &b);
        if !staged.reconciles() {
            warn!("Sync {}: staged snapshot lists an entity twice", sync_id);
        }
        let stats = staged.stats();
        self.store.write_blocking(move |s| s.commit(staged)).await?;

        let report = SyncReport {
            sync_id,
            stats,
            provider_a_entities: a.entity_count(),
            provider_b_entities: b.entity_count(),
            duration: started.elapsed(),
        };
        info!(
            "Sync {} committed in {:.1}s: {} confirmed, {} ambiguous, {} unmapped, {} provider-B only, avg confidence {:.3}",
            sync_id,
            report.duration.as_secs_f64(),
            report.stats.confirmed,
            report.stats.ambiguous,
            report.stats.unmapped,
            report.stats.provider_b_only,
            report.stats.average_confidence
        );
        Ok(report)
    }

    /// Sync every `interval` until [`SyncScheduler::shutdown`] is called.
    /// The first periodic sync fires one interval after start.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return;
        }
        // A zero period would make the ticker panic
        let period = self.interval.max(Duration::from_secs(1));
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Sync loop started (interval: {}s)", self.interval.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.trigger_now().await {
                        warn!("Periodic sync failed: {}", e);
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Sync loop stopped");
    }

    /// Stop the periodic loop. A sync already in progress runs to completion.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}
