use anyhow::{Context, Result};
use dotenv::dotenv;
use std::time::Duration;
use teammap_rust_core::{EngineConfig, MappingEngine, SyncOutcome};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    info!("Starting Team Mapping Service...");

    let config = EngineConfig::from_env().context("Failed to load configuration")?;
    info!(
        "Sync interval {}s, store at {}",
        config.sync_interval.as_secs(),
        config.store_path.display()
    );

    let engine = MappingEngine::init(config).context("Failed to initialize mapping engine")?;

    // Initial sync; a failure leaves whatever snapshot was loaded from disk
    match engine.sync_now().await {
        Ok(SyncOutcome::Completed(report)) => {
            info!(
                "Initial sync {} done in {:.1}s",
                report.sync_id,
                report.duration.as_secs_f64()
            );
        }
        Ok(SyncOutcome::AlreadyRunning) => {}
        Err(e) => error!("Initial sync failed: {}", e),
    }

    let status = engine.get_sync_status();
    match serde_json::to_string_pretty(&status.stats) {
        Ok(stats) => info!("Mapping stats:\n{}", stats),
        Err(e) => warn!("Could not render stats: {}", e),
    }

    engine.start();

    // Periodic status line until shutdown
    let mut status_ticker = tokio::time::interval(Duration::from_secs(300));
    status_ticker.tick().await;
    loop {
        tokio::select! {
            _ = status_ticker.tick() => {
                let status = engine.get_sync_status();
                info!(
                    "Status: last sync {:?}, {} confirmed, {} ambiguous, {} unmapped{}",
                    status.last_sync,
                    status.stats.confirmed,
                    status.stats.ambiguous,
                    status.stats.unmapped,
                    status
                        .last_error
                        .map(|e| format!(", last error: {}", e))
                        .unwrap_or_default()
                );
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down...");
    engine.shutdown().await;
    Ok(())
}
