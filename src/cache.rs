//! Short-lived cache of the loaded event series.
//!
//! Entries are keyed by refresh interval and expire once they are older than
//! that interval. Each key owns an async lock that is held across the fetch,
//! so concurrent callers for the same key wait for one in-flight query and
//! share its result. Failed fetches are never cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::pipeline::{Event, EventSource, PipelineError};

struct CachedFetch {
    fetched_at: Instant,
    events: Arc<Vec<Event>>,
}

type Slot = Arc<tokio::sync::Mutex<Option<CachedFetch>>>;

#[derive(Default)]
pub struct EventCache {
    slots: Mutex<HashMap<u32, Slot>>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: u32) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key).or_default().clone()
    }

    /// Cached series for this refresh interval, fetching from `source` when
    /// the entry is missing or stale.
    pub async fn get_or_fetch(
        &self,
        refresh_interval_seconds: u32,
        source: &dyn EventSource,
    ) -> Result<Arc<Vec<Event>>, PipelineError> {
        let ttl = Duration::from_secs(u64::from(refresh_interval_seconds));
        self.fetch_with(refresh_interval_seconds, ttl, source).await
    }

    async fn fetch_with(
        &self,
        key: u32,
        ttl: Duration,
        source: &dyn EventSource,
    ) -> Result<Arc<Vec<Event>>, PipelineError> {
        let slot = self.slot(key);
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if cached.fetched_at.elapsed() < ttl {
                tracing::trace!(key, "event cache hit");
                return Ok(Arc::clone(&cached.events));
            }
        }

        let events = Arc::new(source.load().await?);
        *entry = Some(CachedFetch {
            fetched_at: Instant::now(),
            events: Arc::clone(&events),
        });
        tracing::debug!(key, events = events.len(), "event cache refreshed");
        Ok(events)
    }

    /// Drop every entry. A fetch already in flight completes into a slot
    /// that is no longer reachable.
    pub fn invalidate(&self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = slots.len();
        slots.clear();
        tracing::debug!(dropped, "event cache invalidated");
    }
}
