mod common;

use common::{premier_league, test_config, FakeSource};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use teammap_rust_core::{
    DiscoveryCrawler, Entity, EntityKind, FetchGate, MappingBuilder, MappingEngine, MappingRecord,
    MappingStore, Provider, SyncOutcome, SyncScheduler,
};
use tempfile::tempdir;

async fn synced() -> (tempfile::TempDir, MappingEngine, Arc<FakeSource>, Arc<FakeSource>) {
    let dir = tempdir().unwrap();
    let (a, b) = premier_league();
    let (a, b) = (Arc::new(a), Arc::new(b));
    let engine = MappingEngine::with_sources(test_config(dir.path()), a.clone(), b.clone()).unwrap();
    engine.sync_now().await.unwrap();
    (dir, engine, a, b)
}

// ============================================================================
// Zero-fallback
// ============================================================================

#[tokio::test]
async fn test_ambiguous_name_never_resolves() {
    let (_dir, engine, _a, b) = synced().await;
    let calls_before = b.calls();

    for _ in 0..3 {
        assert!(engine.resolve("Manchester").await.is_none());
    }
    // Ambiguity is answered from the store, no on-demand retry
    assert_eq!(b.calls(), calls_before);
}

#[tokio::test]
async fn test_unmapped_name_stays_none_while_provider_lacks_it() {
    let (_dir, engine, _a, b) = synced().await;

    assert!(engine.resolve("Brighton").await.is_none());
    assert!(engine.resolve("Brighton").await.is_none());
    assert!(engine.store().get_by_provider_a_name("Brighton").is_none());
    // Scoped through the mapped league, not a name search
    assert_eq!(b.search_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_provider_failure_during_lookup_is_none() {
    let (_dir, engine, _a, b) = synced().await;
    b.add_team("39", "51", "Brighton", "England");
    b.fail_teams_for("39");

    assert!(engine.resolve("Brighton").await.is_none());
    assert!(engine.store().get_by_provider_a_name("Brighton").is_none());
}

// ============================================================================
// On-demand matching
// ============================================================================

#[tokio::test]
async fn test_unmapped_team_resolves_through_mapped_league() {
    let (_dir, engine, _a, b) = synced().await;
    b.add_team("39", "51", "Brighton", "England");

    let team = engine.resolve("Brighton").await.unwrap();
    assert_eq!(team.external_id, "51");
    assert_eq!(team.confidence, 1.0);

    // Written back as an auto record
    let rec = engine.store().get_by_provider_a_name("Brighton").unwrap();
    assert_eq!(rec.a_id, "3079");
    assert!(!rec.verified);
    let stats = engine.get_sync_status().stats;
    assert_eq!(stats.unmapped, 0);
    assert_eq!(stats.total_mappings, stats.confirmed + stats.ambiguous + stats.unmapped);

    // Second call is a store hit
    let team_calls = b.team_calls.load(Ordering::SeqCst);
    assert_eq!(engine.resolve("Brighton").await.unwrap().external_id, "51");
    assert_eq!(b.team_calls.load(Ordering::SeqCst), team_calls);
}

#[tokio::test]
async fn test_on_demand_match_refuses_taken_b_id() {
    let (_dir, engine, _a, b) = synced().await;
    // Provider B now calls its Arsenal entry "Brighton"; id 42 is already Arsenal's
    b.remove_team("39", "42");
    b.add_team("39", "42", "Brighton", "England");

    assert!(engine.resolve("Brighton").await.is_none());
    assert_eq!(engine.resolve("Arsenal").await.unwrap().external_id, "42");
}

#[tokio::test]
async fn test_unknown_name_uses_provider_b_search_without_write_back() {
    let (_dir, engine, _a, b) = synced().await;
    b.set_search_results(vec![
        Entity::team(Provider::B, "66", "Aston Villa", Some("England")),
        Entity::team(Provider::B, "1066", "Villarreal", Some("Spain")),
    ]);

    let team = engine.resolve("Aston Villa").await.unwrap();
    assert_eq!(team.external_id, "66");
    assert_eq!(b.search_calls.load(Ordering::SeqCst), 1);
    // No provider-A id to key a record on
    assert!(engine.store().get_by_provider_a_name("Aston Villa").is_none());

    // Repeat lookups are served from the search cache
    assert_eq!(engine.resolve("aston villa").await.unwrap(), team);
    assert_eq!(b.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cached_search_hit_dropped_once_b_id_is_mapped() {
    let (_dir, engine, _a, b) = synced().await;
    b.set_search_results(vec![Entity::team(Provider::B, "66", "Aston Villa", Some("England"))]);
    assert!(engine.resolve("Aston Villa").await.is_some());

    engine
        .store()
        .upsert(MappingRecord::manual(
            EntityKind::Team,
            "3073",
            "Villa",
            "66",
            "Aston Villa",
            Some("England"),
        ))
        .unwrap();

    assert!(engine.resolve("Aston Villa").await.is_none());
    assert_eq!(b.search_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_name_without_confident_match_is_none() {
    let (_dir, engine, _a, b) = synced().await;
    b.set_search_results(vec![
        Entity::team(Provider::B, "505", "Internazionale", Some("Italy")),
        Entity::team(Provider::B, "9568", "Inter Miami", Some("USA")),
    ]);

    assert!(engine.resolve("Inter").await.is_none());
    assert!(engine.resolve("Inter").await.is_none());
}

#[tokio::test]
async fn test_leagues_are_not_team_names() {
    let (_dir, engine, _a, _b) = synced().await;
    // "Premier League" is a confirmed league, not a team
    assert!(engine.store().get_by_provider_a_name("Premier League").is_none());
    assert!(engine.store().league_for_a_id("152").is_some());
    assert!(engine.store().snapshot().record_for(EntityKind::League, "152").is_some());
}

// ============================================================================
// Scheduler
// ============================================================================

fn scheduler(a: Arc<FakeSource>, b: Arc<FakeSource>) -> (Arc<SyncScheduler>, Arc<MappingStore>) {
    let crawler = Arc::new(DiscoveryCrawler::new(
        a,
        b,
        Arc::new(FetchGate::new()),
        test_config(std::path::Path::new(".")).retry,
        Vec::new(),
    ));
    let store = Arc::new(MappingStore::in_memory());
    let scheduler = Arc::new(SyncScheduler::new(
        crawler,
        MappingBuilder::default(),
        store.clone(),
        Duration::from_secs(3600),
    ));
    (scheduler, store)
}

#[tokio::test]
async fn test_trigger_during_sync_reports_already_running() {
    let (a, b) = premier_league();
    a.set_delay(Duration::from_millis(200));
    let (scheduler, store) = scheduler(Arc::new(a), Arc::new(b));

    let first = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.trigger_now().await })
    };
    while !scheduler.is_running() {
        tokio::task::yield_now().await;
    }

    let second = scheduler.trigger_now().await.unwrap();
    assert!(matches!(second, SyncOutcome::AlreadyRunning));

    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, SyncOutcome::Completed(_)));
    assert_eq!(store.stats().confirmed, 2);
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn test_sync_report_counts_catalogs() {
    let (a, b) = premier_league();
    let (scheduler, _store) = scheduler(Arc::new(a), Arc::new(b));

    let SyncOutcome::Completed(report) = scheduler.trigger_now().await.unwrap() else {
        panic!("expected a completed sync");
    };
    assert_eq!(report.provider_a_entities, 4);
    assert_eq!(report.provider_b_entities, 5);
    assert_eq!(report.stats.confirmed, 2);
}

#[tokio::test]
async fn test_shutdown_before_run_exits_immediately() {
    let (a, b) = premier_league();
    let (a, b) = (Arc::new(a), Arc::new(b));
    let (scheduler, _store) = scheduler(a.clone(), b);

    scheduler.shutdown();
    tokio::time::timeout(Duration::from_secs(1), scheduler.clone().run())
        .await
        .unwrap();
    assert_eq!(a.league_calls.load(Ordering::SeqCst), 0);
}
