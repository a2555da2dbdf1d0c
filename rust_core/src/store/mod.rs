//! Mapping store: the single owner of committed mapping state.
//!
//! Readers take an `Arc` of the current [`MappingSnapshot`] and never block
//! writers. Writers serialize on `write_lock`, derive the next snapshot from a
//! clone of the current one, persist it, and only then swap it in. A failed
//! write leaves the previous snapshot active.
//!
//! Persistence is a pretty-printed JSON file written to `<path>.tmp` and
//! renamed over the target. Async callers go through
//! [`MappingStore::write_blocking`].

pub mod snapshot;

pub use snapshot::{EntityKey, MappingSnapshot, UpsertOutcome};

use crate::discovery::ProviderCatalog;
use crate::error::{MappingError, Result};
use crate::matching::BuildOutcome;
use crate::types::{EntityKind, MappingRecord, SupersededRecord, SyncStats, SyncStatus};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct MappingStore {
    current: RwLock<Arc<MappingSnapshot>>,
    write_lock: Mutex<()>,
    path: Option<PathBuf>,
    last_error: RwLock<Option<String>>,
}

impl MappingStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_snapshot(MappingSnapshot::default(), None)
    }

    /// Open the store at `path`, loading the last committed snapshot if present.
    ///
    /// A missing file starts an empty store; an unreadable one is an error so a
    /// corrupt snapshot is never silently replaced.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let mut snapshot: MappingSnapshot = serde_json::from_str(&content).map_err(|e| {
                MappingError::Persistence(format!("corrupt snapshot {}: {}", path.display(), e))
            })?;
            snapshot.reindex();
            info!(
                "Loaded {} mappings ({} ambiguous, {} unmapped) from {}",
                snapshot.records.len(),
                snapshot.ambiguous.len(),
                snapshot.unmapped.len(),
                path.display()
            );
            snapshot
        } else {
            debug!("No snapshot at {}, starting empty", path.display());
            MappingSnapshot::default()
        };
        Ok(Self::with_snapshot(snapshot, Some(path)))
    }

    fn with_snapshot(snapshot: MappingSnapshot, path: Option<PathBuf>) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
            path,
            last_error: RwLock::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The committed snapshot at this instant.
    pub fn snapshot(&self) -> Arc<MappingSnapshot> {
        self.current.read().clone()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Insert or replace the mapping for one provider-A entity.
    ///
    /// Auto writes never modify a verified record and never take a B id held
    /// by a pinned or more confident record.
    pub fn upsert(&self, record: MappingRecord) -> Result<UpsertOutcome> {
        let _guard = self.write_lock.lock();
        let mut next = (*self.snapshot()).clone();
        let outcome = next.apply_upsert(record, Utc::now());
        if let UpsertOutcome::Rejected { held_by } = &outcome {
            debug!("Upsert rejected: B id already held by A id {}", held_by);
            return Ok(outcome);
        }
        self.swap(next)?;
        Ok(outcome)
    }

    /// Pin a record so later syncs keep it unchanged. `None` if there is no such record.
    pub fn verify(&self, kind: EntityKind, a_id: &str) -> Result<Option<MappingRecord>> {
        let _guard = self.write_lock.lock();
        let mut next = (*self.snapshot()).clone();
        let Some(record) = next.apply_verify(kind, a_id, Utc::now()) else {
            return Ok(None);
        };
        self.swap(next)?;
        info!("Verified {} mapping {} -> {}", kind.as_str(), record.a_id, record.b_id);
        Ok(Some(record))
    }

    /// Derive the snapshot a build would produce without committing it.
    pub fn stage_build(
        &self,
        outcome: &BuildOutcome,
        a: &ProviderCatalog,
        b: &ProviderCatalog,
    ) -> MappingSnapshot {
        self.snapshot().apply_build(outcome, a, b, Utc::now())
    }

    /// Atomically replace the committed state with `snapshot`.
    ///
    /// Records verified or manually written since `snapshot` was staged are
    /// carried into it, so a sync never undoes an operator action. A staged
    /// auto record that claims the same B id is demoted to ambiguous.
    pub fn commit(&self, mut snapshot: MappingSnapshot) -> Result<()> {
        let _guard = self.write_lock.lock();
        let current = self.snapshot();
        let now = Utc::now();
        for pinned in current.records.iter().filter(|r| r.verified) {
            let stale = snapshot
                .record_for(pinned.kind, &pinned.a_id)
                .map_or(true, |r| {
                    !r.verified || r.b_id != pinned.b_id || r.source != pinned.source
                });
            if stale {
                snapshot.apply_upsert(pinned.clone(), now);
            }
        }
        self.swap(snapshot)?;
        *self.last_error.write() = None;
        Ok(())
    }

    /// Run a store write on the blocking pool so the file write never stalls
    /// a runtime worker.
    pub async fn write_blocking<T, F>(self: &Arc<Self>, write: F) -> Result<T>
    where
        F: FnOnce(&MappingStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || write(&store))
            .await
            .map_err(|e| MappingError::Persistence(format!("store write task failed: {}", e)))?
    }

    /// Note a sync that failed before commit; the committed state is untouched.
    pub fn record_sync_failure(&self, message: impl Into<String>) {
        let message = message.into();
        warn!("Sync failed, keeping previous mappings: {}", message);
        *self.last_error.write() = Some(message);
    }

    fn swap(&self, snapshot: MappingSnapshot) -> Result<()> {
        if let Some(path) = &self.path {
            persist(path, &snapshot)?;
        }
        *self.current.write() = Arc::new(snapshot);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get_by_provider_a_name(&self, name: &str) -> Option<MappingRecord> {
        self.snapshot().get_by_provider_a_name(name).cloned()
    }

    pub fn get_by_provider_b_name(&self, name: &str) -> Option<MappingRecord> {
        self.snapshot().get_by_provider_b_name(name).cloned()
    }

    pub fn league_for_a_id(&self, a_league_id: &str) -> Option<MappingRecord> {
        self.snapshot().league_for_a_id(a_league_id).cloned()
    }

    pub fn history(&self, kind: EntityKind, a_id: &str) -> Vec<SupersededRecord> {
        self.snapshot()
            .history_for(kind, a_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> SyncStats {
        self.snapshot().stats()
    }

    pub fn sync_status(&self) -> SyncStatus {
        let snapshot = self.snapshot();
        SyncStatus {
            last_sync: snapshot.last_sync,
            last_error: self.last_error.read().clone(),
            stats: snapshot.stats(),
        }
    }
}

fn persist(path: &Path, snapshot: &MappingSnapshot) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_vec_pretty(snapshot)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    debug!("Persisted {} mappings to {}", snapshot.records.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::MappingBuilder;
    use crate::types::{Entity, Provider, SupersedeReason};
    use tempfile::tempdir;

    fn arsenal_catalogs() -> (ProviderCatalog, ProviderCatalog) {
        let mut a = ProviderCatalog::new(Provider::A);
        a.push_team(Entity::team(Provider::A, "1", "Arsenal", Some("England")));
        let mut b = ProviderCatalog::new(Provider::B);
        b.push_team(Entity::team(Provider::B, "42", "Arsenal", Some("England")));
        (a, b)
    }

    fn synced(store: &MappingStore) {
        let (a, b) = arsenal_catalogs();
        let outcome = MappingBuilder::default().build(&a, &b);
        let staged = store.stage_build(&outcome, &a, &b);
        store.commit(staged).unwrap();
    }

    #[test]
    fn test_commit_and_lookup() {
        let store = MappingStore::in_memory();
        synced(&store);
        let rec = store.get_by_provider_a_name("arsenal").unwrap();
        assert_eq!(rec.b_id, "42");
        assert!(store.sync_status().last_sync.is_some());
    }

    #[test]
    fn test_reader_snapshot_unaffected_by_later_commit() {
        let store = MappingStore::in_memory();
        let before = store.snapshot();
        synced(&store);
        assert!(before.records.is_empty());
        assert_eq!(store.snapshot().records.len(), 1);
    }

    #[test]
    fn test_persist_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("mappings.json");
        {
            let store = MappingStore::open(&path).unwrap();
            synced(&store);
            store.verify(EntityKind::Team, "1").unwrap();
        }
        assert!(path.exists());
        let reopened = MappingStore::open(&path).unwrap();
        let rec = reopened.get_by_provider_b_name("Arsenal").unwrap();
        assert!(rec.verified);
        assert_eq!(reopened.history(EntityKind::Team, "1").len(), 1);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            MappingStore::open(&path),
            Err(MappingError::Persistence(_))
        ));
    }

    #[test]
    fn test_failure_is_reported_and_cleared_by_commit() {
        let store = MappingStore::in_memory();
        store.record_sync_failure("both providers failed");
        assert_eq!(
            store.sync_status().last_error.as_deref(),
            Some("both providers failed")
        );
        synced(&store);
        assert!(store.sync_status().last_error.is_none());
    }

    #[test]
    fn test_commit_keeps_verification_made_after_staging() {
        let store = MappingStore::in_memory();
        synced(&store);

        let (a, b) = arsenal_catalogs();
        let outcome = MappingBuilder::default().build(&a, &b);
        let staged = store.stage_build(&outcome, &a, &b);
        store.verify(EntityKind::Team, "1").unwrap();
        store.commit(staged).unwrap();

        assert!(store.get_by_provider_a_name("Arsenal").unwrap().verified);
    }

    #[test]
    fn test_commit_demotes_auto_claim_on_b_id_pinned_after_staging() {
        let store = MappingStore::in_memory();
        let (a, b) = arsenal_catalogs();
        let outcome = MappingBuilder::default().build(&a, &b);
        let staged = store.stage_build(&outcome, &a, &b);
        assert_eq!(staged.holders_of(EntityKind::Team, "42").len(), 1);

        store
            .upsert(MappingRecord::manual(
                EntityKind::Team,
                "9",
                "Arsenal London",
                "42",
                "Arsenal",
                Some("England"),
            ))
            .unwrap();
        store.commit(staged).unwrap();

        let snap = store.snapshot();
        let holders = snap.holders_of(EntityKind::Team, "42");
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].a_id, "9");
        assert!(snap.record_for(EntityKind::Team, "1").is_none());
        assert!(snap.ambiguous_by_name(EntityKind::Team, "Arsenal").is_some());
        let history = store.history(EntityKind::Team, "1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].reason, SupersedeReason::LostConflict);
        assert_eq!(store.stats().conflicts_demoted, 1);
        assert!(snap.reconciles());
    }

    #[tokio::test]
    async fn test_write_blocking_persists_off_runtime() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        let store = Arc::new(MappingStore::open(&path).unwrap());

        let outcome = store
            .write_blocking(|s| {
                s.upsert(MappingRecord::manual(EntityKind::Team, "1", "Arsenal", "42", "Arsenal", None))
            })
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        assert!(path.exists());
        assert_eq!(store.get_by_provider_a_name("Arsenal").unwrap().b_id, "42");
    }

    #[test]
    fn test_rejected_upsert_does_not_change_state() {
        let store = MappingStore::in_memory();
        store
            .upsert(MappingRecord::manual(EntityKind::Team, "1", "Arsenal", "42", "Arsenal", None))
            .unwrap();
        let a = Entity::team(Provider::A, "2", "Arsenal FC", None);
        let b = Entity::team(Provider::B, "42", "Arsenal", None);
        let outcome = store.upsert(MappingRecord::auto(&a, &b, 0.9)).unwrap();
        assert!(matches!(outcome, UpsertOutcome::Rejected { .. }));
        assert_eq!(store.snapshot().records.len(), 1);
    }
}
