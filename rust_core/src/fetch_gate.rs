//! Per-key pacing for provider calls.
//!
//! Each key (one per provider endpoint) remembers when it was last invoked.
//! A call arriving sooner than `min_delay` after that suspends until the delay
//! has passed. Callers on the same key serialize through the key's async lock;
//! different keys never contend.
//!
//! On success the timestamp becomes "now". On failure it is backdated to
//! `now - min_delay / 2`, so a failing endpoint is retried after half the
//! usual spacing instead of sitting behind a full fresh delay.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::debug;

type Slot = Arc<AsyncMutex<Option<Instant>>>;

#[derive(Debug, Default)]
pub struct FetchGate {
    /// key -> last invocation time; the outer lock is only held to find the slot
    slots: Mutex<FxHashMap<String, Slot>>,
}

impl FetchGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock();
        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    /// Run `f` under the pacing rules for `key`.
    pub async fn execute<F, Fut, T, E>(&self, key: &str, min_delay: Duration, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = self.slot(key);
        let mut last = slot.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < min_delay {
                let wait = min_delay - elapsed;
                debug!("Fetch gate '{}': waiting {}ms", key, wait.as_millis());
                tokio::time::sleep(wait).await;
            }
        }

        let result = f().await;

        let now = Instant::now();
        *last = match &result {
            Ok(_) => Some(now),
            Err(_) => now.checked_sub(min_delay / 2),
        };

        result
    }

    /// When `key` was last invoked (backdated after a failure). `None` if never.
    pub async fn last_invocation(&self, key: &str) -> Option<Instant> {
        let slot = {
            let slots = self.slots.lock();
            slots.get(key).cloned()
        }?;
        let last = slot.lock().await;
        *last
    }

    /// Forget all timestamps.
    pub fn reset(&self) {
        self.slots.lock().clear();
    }

    pub fn key_count(&self) -> usize {
        self.slots.lock().len()
    }
}
