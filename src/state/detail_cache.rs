use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::SourceError;

struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

/// Per-key cache for on-demand lookups (detail pages, charts).
///
/// - Entries younger than `stale_after` are served without fetching.
/// - Concurrent misses on the same key share one fetch: later callers wait
///   on the key's lock and then read what the first caller stored.
/// - A failed refetch falls back to the stale entry when one exists, except
///   for `NotFound`, which is passed through.
pub struct DetailCache<T> {
    entries: DashMap<String, Cached<T>>,
    inflight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    stale_after: Duration,
}

/// A caller's handle on a key's fetch lock. Dropping the last handle removes
/// the lock from the map, so keys that never get cached leave nothing behind.
struct InflightSlot<'a> {
    map: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    key: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        // One reference in the map plus ours: nobody else is waiting.
        self.map
            .remove_if(self.key, |_, lock| Arc::strong_count(lock) == 2);
    }
}

impl<T: Clone> DetailCache<T> {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
            stale_after,
        }
    }

    fn fresh(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        if entry.fetched_at.elapsed() < self.stale_after {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<T, SourceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        if let Some(v) = self.fresh(key) {
            return Ok(v);
        }

        let slot = InflightSlot {
            map: &self.inflight,
            key,
            lock: self.inflight.entry(key.to_string()).or_default().clone(),
        };
        let _guard = slot.lock.lock().await;

        if let Some(v) = self.fresh(key) {
            debug!(key, "detail cache: served by concurrent fetch");
            return Ok(v);
        }

        match fetch().await {
            Ok(value) => {
                self.entries.insert(
                    key.to_string(),
                    Cached {
                        value: value.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Ok(value)
            }
            Err(SourceError::NotFound(s)) => {
                self.entries.remove(key);
                Err(SourceError::NotFound(s))
            }
            Err(e) => match self.entries.get(key) {
                Some(stale) => {
                    warn!(key, "detail refetch failed, serving stale entry: {e}");
                    Ok(stale.value.clone())
                }
                None => Err(e),
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
