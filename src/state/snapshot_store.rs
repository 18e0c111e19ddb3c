use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::types::MarketRecord;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One complete, immutable set of records from a single poll.
#[derive(Debug)]
pub struct Snapshot {
    /// Poll sequence number that produced this snapshot.
    pub seq: u64,
    pub records: Vec<MarketRecord>,
    pub fetched_at: DateTime<Utc>,
    received_at: Instant,
}

impl Snapshot {
    pub fn new(seq: u64, records: Vec<MarketRecord>) -> Self {
        Self {
            seq,
            records,
            fetched_at: Utc::now(),
            received_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }

    pub fn is_stale(&self, stale_after: Duration) -> bool {
        self.age() >= stale_after
    }

    /// Case-insensitive symbol lookup.
    pub fn find(&self, symbol: &str) -> Option<&MarketRecord> {
        self.records
            .iter()
            .find(|m| m.symbol.eq_ignore_ascii_case(symbol))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PollError {
    pub seq: u64,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Last good snapshot paired with the most recent unresolved poll error.
#[derive(Debug, Clone, Default)]
pub struct StoreStatus {
    pub snapshot: Option<Arc<Snapshot>>,
    pub last_error: Option<PollError>,
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Inner {
    snapshot: Option<Arc<Snapshot>>,
    last_error: Option<PollError>,
    /// Highest poll sequence applied so far, success or failure.
    latest_seq: u64,
}

/// Single-writer / multi-reader holder of the current snapshot.
///
/// Readers clone the `Arc` and drop the lock immediately. Outcomes are
/// applied last-request-wins: anything tagged with a sequence number at or
/// below the newest one already applied is discarded.
pub struct SnapshotStore {
    inner: RwLock<Inner>,
    published_tx: watch::Sender<u64>,
}

impl SnapshotStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the snapshot wholesale. Returns `None` if `seq` was superseded.
    pub fn publish(&self, seq: u64, records: Vec<MarketRecord>) -> Option<Arc<Snapshot>> {
        let snapshot = {
            let mut inner = self.write();
            if seq <= inner.latest_seq {
                return None;
            }
            let snapshot = Arc::new(Snapshot::new(seq, records));
            inner.latest_seq = seq;
            inner.snapshot = Some(Arc::clone(&snapshot));
            inner.last_error = None;
            snapshot
        };
        self.published_tx.send_replace(seq);
        Some(snapshot)
    }

    /// Record a failed poll. The previous snapshot, if any, stays current.
    pub fn record_error(&self, seq: u64, message: impl Into<String>) -> bool {
        let mut inner = self.write();
        if seq <= inner.latest_seq {
            return false;
        }
        inner.latest_seq = seq;
        inner.last_error = Some(PollError {
            seq,
            message: message.into(),
            at: Utc::now(),
        });
        true
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.read().snapshot.clone()
    }

    pub fn status(&self) -> StoreStatus {
        let inner = self.read();
        StoreStatus {
            snapshot: inner.snapshot.clone(),
            last_error: inner.last_error.clone(),
        }
    }

    pub fn latest_seq(&self) -> u64 {
        self.read().latest_seq
    }

    /// Watch the sequence number of the most recently published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.published_tx.subscribe()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        let (published_tx, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner::default()),
            published_tx,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
