//! Shared health state for the /health endpoint.
//! Updated by the snapshot poller and the history writer.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::Utc;

/// Shared health counters. Background tasks record, API reads.
#[derive(Default)]
pub struct HealthState {
    polls_ok: AtomicU64,
    polls_failed: AtomicU64,
    /// Unix millis of the last successful poll (0 = none).
    last_success_ms: AtomicI64,
    /// Snapshots queued for the history writer.
    history_pending: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_poll_success(&self) {
        self.polls_ok.fetch_add(1, Ordering::Relaxed);
        self.last_success_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn record_poll_failure(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_history_pending(&self) {
        self.history_pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_history_pending(&self) {
        // Saturate so a writer started without the poller never wraps.
        let _ = self
            .history_pending
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn polls_ok(&self) -> u64 {
        self.polls_ok.load(Ordering::Relaxed)
    }

    pub fn polls_failed(&self) -> u64 {
        self.polls_failed.load(Ordering::Relaxed)
    }

    pub fn last_success_ms(&self) -> Option<i64> {
        match self.last_success_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    pub fn history_pending(&self) -> u64 {
        self.history_pending.load(Ordering::Relaxed)
    }
}
