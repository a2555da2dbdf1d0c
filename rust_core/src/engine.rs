//! Top-level context object wiring the gate, crawler, store, lookup service
//! and scheduler together.

use crate::clients::{ProviderAClient, ProviderBClient};
use crate::config::EngineConfig;
use crate::discovery::DiscoveryCrawler;
use crate::error::Result;
use crate::fetch_gate::FetchGate;
use crate::lookup::LookupService;
use crate::matching::MappingBuilder;
use crate::providers::CatalogSource;
use crate::scheduler::{SyncOutcome, SyncScheduler};
use crate::store::MappingStore;
use crate::types::{MappedTeam, SyncStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug)]
pub struct MappingEngine {
    gate: Arc<FetchGate>,
    store: Arc<MappingStore>,
    lookup: LookupService,
    scheduler: Arc<SyncScheduler>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl MappingEngine {
    /// Build the engine against the real provider APIs and load the persisted snapshot.
    pub fn init(config: EngineConfig) -> Result<Self> {
        let a: Arc<dyn CatalogSource> = Arc::new(ProviderAClient::new(
            &config.provider_a,
            config.fixture_window_days,
        ));
        let b: Arc<dyn CatalogSource> =
            Arc::new(ProviderBClient::new(&config.provider_b, config.season));
        Self::with_sources(config, a, b)
    }

    /// Build the engine against arbitrary catalog sources.
    pub fn with_sources(
        config: EngineConfig,
        a: Arc<dyn CatalogSource>,
        b: Arc<dyn CatalogSource>,
    ) -> Result<Self> {
        config.thresholds.validate()?;

        let store = Arc::new(MappingStore::open(&config.store_path)?);
        let gate = Arc::new(FetchGate::new());
        let crawler = Arc::new(DiscoveryCrawler::new(
            a,
            b,
            gate.clone(),
            config.retry,
            config.country_filter.clone(),
        ));
        let lookup = LookupService::new(store.clone(), crawler.clone(), config.thresholds);
        let scheduler = Arc::new(SyncScheduler::new(
            crawler,
            MappingBuilder::new(config.thresholds),
            store.clone(),
            config.sync_interval,
        ));

        info!(
            "Mapping engine initialized (store: {}, {} confirmed mappings)",
            config.store_path.display(),
            store.snapshot().records.len()
        );

        Ok(Self {
            gate,
            store,
            lookup,
            scheduler,
            sync_task: Mutex::new(None),
        })
    }

    /// Start the periodic sync loop. Calling it twice has no effect.
    pub fn start(&self) {
        let mut task = self.sync_task.lock();
        if task.is_some() {
            return;
        }
        let scheduler = self.scheduler.clone();
        *task = Some(tokio::spawn(scheduler.run()));
    }

    pub async fn sync_now(&self) -> Result<SyncOutcome> {
        self.scheduler.trigger_now().await
    }

    pub async fn resolve(&self, name: &str) -> Option<MappedTeam> {
        self.lookup.resolve(name).await
    }

    pub fn reverse_resolve(&self, name: &str) -> Option<MappedTeam> {
        self.lookup.reverse_resolve(name)
    }

    pub fn get_sync_status(&self) -> SyncStatus {
        self.lookup.get_sync_status()
    }

    /// Direct access for manual operations (`upsert`, `verify`, `history`).
    pub fn store(&self) -> &Arc<MappingStore> {
        &self.store
    }

    /// Stop the sync loop and wait for it to exit.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();
        let task = self.sync_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Sync loop ended abnormally: {}", e);
            }
        }
        self.gate.reset();
        info!("Mapping engine stopped");
    }
}
