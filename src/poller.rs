use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::config::{Config, CHANNEL_CAPACITY, POLL_RETRY_BACKOFF_MS};
use crate::error::{AppError, Result, SourceError};
use crate::source::MarketSource;
use crate::state::{Snapshot, SnapshotStore};
use crate::types::MarketRecord;

#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Minimum gap between one poll settling and the next one starting.
    pub interval: Duration,
    /// Refresh requests are answered from cache while the snapshot is younger than this.
    pub stale_after: Duration,
    /// Delays between fetch attempts inside one poll.
    pub retry_backoff: Vec<Duration>,
}

impl PollerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            interval: cfg.poll_interval,
            stale_after: cfg.stale_after,
            retry_backoff: POLL_RETRY_BACKOFF_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// Served from the cached snapshot; nothing was fetched.
    Fresh { seq: u64 },
    /// A poll ran and published snapshot `seq`.
    Refreshed { seq: u64 },
    /// A poll ran and failed; the previous snapshot (if any) stays current.
    Failed { message: String },
}

pub struct RefreshRequest {
    force: bool,
    reply: oneshot::Sender<RefreshOutcome>,
}

/// Cloneable handle for asking the poller to refresh ahead of schedule.
#[derive(Clone)]
pub struct RefreshHandle {
    tx: mpsc::Sender<RefreshRequest>,
}

impl RefreshHandle {
    /// `force` skips the staleness window and cancels a poll already in flight.
    pub async fn refresh(&self, force: bool) -> Result<RefreshOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RefreshRequest { force, reply })
            .await
            .map_err(|_| AppError::NoData("poller is not running".to_string()))?;
        rx.await
            .map_err(|_| AppError::NoData("poller dropped the refresh request".to_string()))
    }
}

/// Background task that keeps the snapshot store current.
///
/// - Polls once at startup, then no sooner than `interval` after the
///   previous poll settled.
/// - Refresh requests queued while a poll runs are all answered by it.
/// - Every poll carries a new sequence number; a forced refresh drops the
///   in-flight fetch and starts a newer one.
/// - Failures keep the last good snapshot and are recorded in the store.
pub struct SnapshotPoller {
    source: Arc<dyn MarketSource>,
    store: Arc<SnapshotStore>,
    health: Arc<HealthState>,
    settings: PollerSettings,
    refresh_rx: mpsc::Receiver<RefreshRequest>,
    history_tx: Option<mpsc::Sender<Arc<Snapshot>>>,
    next_seq: u64,
}

impl SnapshotPoller {
    pub fn new(
        source: Arc<dyn MarketSource>,
        store: Arc<SnapshotStore>,
        health: Arc<HealthState>,
        settings: PollerSettings,
    ) -> (Self, RefreshHandle) {
        let (tx, refresh_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let poller = Self {
            source,
            store,
            health,
            settings,
            refresh_rx,
            history_tx: None,
            next_seq: 0,
        };
        (poller, RefreshHandle { tx })
    }

    /// Forward every published snapshot to the price history writer.
    pub fn with_history(mut self, history_tx: mpsc::Sender<Arc<Snapshot>>) -> Self {
        self.history_tx = Some(history_tx);
        self
    }

    pub async fn run(mut self) {
        info!(
            source = self.source.name(),
            interval_secs = self.settings.interval.as_secs_f64(),
            stale_after_secs = self.settings.stale_after.as_secs_f64(),
            "Snapshot poller started"
        );

        let mut pending: Vec<RefreshRequest> = Vec::new();
        loop {
            let outcome = self.poll(&mut pending).await;
            for req in pending.drain(..) {
                let _ = req.reply.send(outcome.clone());
            }

            let next_due = Instant::now() + self.settings.interval;
            loop {
                tokio::select! {
                    _ = sleep_until(next_due) => break,
                    Some(req) = self.refresh_rx.recv() => {
                        if let Some(seq) = self.fresh_seq(req.force) {
                            let _ = req.reply.send(RefreshOutcome::Fresh { seq });
                            continue;
                        }
                        pending.push(req);
                        break;
                    }
                }
            }
        }
    }

    /// Sequence of the cached snapshot if it can answer a refresh request.
    fn fresh_seq(&self, force: bool) -> Option<u64> {
        if force {
            return None;
        }
        self.store
            .current()
            .filter(|s| !s.is_stale(self.settings.stale_after))
            .map(|s| s.seq)
    }

    async fn poll(&mut self, pending: &mut Vec<RefreshRequest>) -> RefreshOutcome {
        loop {
            self.next_seq += 1;
            let seq = self.next_seq;
            let started = Instant::now();

            let fetch = fetch_with_retry(self.source.as_ref(), &self.settings.retry_backoff);
            tokio::pin!(fetch);

            let result = loop {
                tokio::select! {
                    biased;
                    res = &mut fetch => break Some(res),
                    Some(req) = self.refresh_rx.recv() => {
                        let force = req.force;
                        pending.push(req);
                        if force {
                            break None;
                        }
                    }
                }
            };

            let Some(result) = result else {
                info!(seq, "Poll superseded by forced refresh, restarting");
                continue;
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            return match result {
                Ok(records) => self.apply_success(seq, records, elapsed_ms),
                Err(e) => {
                    error!(seq, elapsed_ms, "Market poll failed: {e}");
                    self.health.record_poll_failure();
                    self.store.record_error(seq, e.to_string());
                    RefreshOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            };
        }
    }

    fn apply_success(&self, seq: u64, records: Vec<MarketRecord>, elapsed_ms: u64) -> RefreshOutcome {
        let count = records.len();
        self.health.record_poll_success();
        let Some(snapshot) = self.store.publish(seq, records) else {
            warn!(seq, "Poll result superseded before publish, discarded");
            return RefreshOutcome::Refreshed {
                seq: self.store.latest_seq(),
            };
        };

        info!(
            seq,
            records = count,
            elapsed_ms,
            source = self.source.name(),
            "Snapshot published: {count} markets"
        );

        if let Some(tx) = &self.history_tx {
            match tx.try_send(Arc::clone(&snapshot)) {
                Ok(()) => self.health.inc_history_pending(),
                Err(e) => warn!("History writer channel full: {e}"),
            }
        }
        RefreshOutcome::Refreshed { seq }
    }
}

/// Fetch a snapshot, retrying transient failures on the given backoff schedule.
async fn fetch_with_retry(
    source: &dyn MarketSource,
    backoff: &[Duration],
) -> std::result::Result<Vec<MarketRecord>, SourceError> {
    let mut attempt = 0usize;
    loop {
        match source.fetch_markets().await {
            Ok(records) => return Ok(records),
            Err(e) => match backoff.get(attempt) {
                Some(delay) if is_transient(&e) => {
                    warn!(
                        attempt = attempt + 1,
                        "Market fetch failed, retrying in {}ms: {e}",
                        delay.as_millis()
                    );
                    sleep(*delay).await;
                    attempt += 1;
                }
                _ => return Err(e),
            },
        }
    }
}

fn is_transient(e: &SourceError) -> bool {
    match e {
        SourceError::Http(_) => true,
        SourceError::Status(code) => *code >= 500 || *code == 429,
        SourceError::Malformed(_) | SourceError::NotFound(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::query::fixtures::btc_eth;
    use crate::types::{ChartPoint, MarketDetail, Timeframe};

    type Step = (Duration, std::result::Result<Vec<MarketRecord>, SourceError>);

    /// Replays scripted fetch results; once the script runs out it keeps
    /// answering with the BTC/ETH snapshot.
    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MarketSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn fetch_markets(&self) -> std::result::Result<Vec<MarketRecord>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some((delay, result)) => {
                    sleep(delay).await;
                    result
                }
                None => Ok(btc_eth()),
            }
        }

        async fn fetch_detail(&self, symbol: &str) -> std::result::Result<MarketDetail, SourceError> {
            Err(SourceError::NotFound(symbol.to_string()))
        }

        async fn fetch_chart(
            &self,
            symbol: &str,
            _timeframe: Timeframe,
        ) -> std::result::Result<Vec<ChartPoint>, SourceError> {
            Err(SourceError::NotFound(symbol.to_string()))
        }
    }

    fn settings(interval_ms: u64, stale_ms: u64) -> PollerSettings {
        PollerSettings {
            interval: Duration::from_millis(interval_ms),
            stale_after: Duration::from_millis(stale_ms),
            retry_backoff: vec![Duration::from_millis(1)],
        }
    }

    fn spawn(
        source: Arc<ScriptedSource>,
        settings: PollerSettings,
    ) -> (Arc<SnapshotStore>, Arc<HealthState>, RefreshHandle) {
        let store = SnapshotStore::new();
        let health = Arc::new(HealthState::new());
        let (poller, handle) = SnapshotPoller::new(source, Arc::clone(&store), Arc::clone(&health), settings);
        tokio::spawn(poller.run());
        (store, health, handle)
    }

    async fn wait_for_seq(store: &SnapshotStore, seq: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.latest_seq() < seq {
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("poller did not reach the expected sequence");
    }

    #[tokio::test]
    async fn first_poll_publishes_immediately() {
        let source = ScriptedSource::new(vec![]);
        let (store, health, _handle) = spawn(Arc::clone(&source), settings(60_000, 60_000));

        wait_for_seq(&store, 1).await;
        let snap = store.current().unwrap();
        assert_eq!(snap.seq, 1);
        assert_eq!(snap.records.len(), 2);
        assert_eq!(health.polls_ok(), 1);
    }

    #[tokio::test]
    async fn failed_poll_keeps_last_good_snapshot() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(btc_eth())),
            (Duration::ZERO, Err(SourceError::Malformed("not an array".into()))),
            (Duration::from_secs(30), Ok(vec![])),
        ]);
        let (store, health, _handle) = spawn(Arc::clone(&source), settings(10, 60_000));

        wait_for_seq(&store, 2).await;
        let status = store.status();
        assert_eq!(status.snapshot.unwrap().seq, 1);
        assert_eq!(status.last_error.unwrap().seq, 2);
        assert_eq!(health.polls_failed(), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_within_one_poll() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Err(SourceError::Status(503))),
            (Duration::ZERO, Ok(btc_eth())),
        ]);
        let (store, _health, _handle) = spawn(Arc::clone(&source), settings(60_000, 60_000));

        wait_for_seq(&store, 1).await;
        assert_eq!(store.current().unwrap().seq, 1);
        assert!(store.status().last_error.is_none());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn refresh_within_staleness_window_is_served_from_cache() {
        let source = ScriptedSource::new(vec![]);
        let (store, _health, handle) = spawn(Arc::clone(&source), settings(60_000, 60_000));
        wait_for_seq(&store, 1).await;

        assert_eq!(handle.refresh(false).await.unwrap(), RefreshOutcome::Fresh { seq: 1 });
        assert_eq!(source.calls(), 1);

        assert_eq!(handle.refresh(true).await.unwrap(), RefreshOutcome::Refreshed { seq: 2 });
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_refreshes_share_one_poll() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(btc_eth())),
            (Duration::from_millis(50), Ok(btc_eth())),
        ]);
        let (store, _health, handle) = spawn(Arc::clone(&source), settings(60_000, 0));
        wait_for_seq(&store, 1).await;

        let (a, b, c) = tokio::join!(handle.refresh(false), handle.refresh(false), handle.refresh(false));
        let expected = RefreshOutcome::Refreshed { seq: 2 };
        assert_eq!(a.unwrap(), expected);
        assert_eq!(b.unwrap(), expected);
        assert_eq!(c.unwrap(), expected);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn forced_refresh_supersedes_in_flight_poll() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(btc_eth())),
            (Duration::from_secs(30), Ok(vec![])),
            (Duration::ZERO, Ok(btc_eth())),
        ]);
        let (store, _health, handle) = spawn(Arc::clone(&source), settings(60_000, 0));
        wait_for_seq(&store, 1).await;

        let slow = handle.clone();
        let first = tokio::spawn(async move { slow.refresh(false).await });
        // Let the slow fetch start before forcing.
        tokio::time::timeout(Duration::from_secs(5), async {
            while source.calls() < 2 {
                sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        let forced = handle.refresh(true).await.unwrap();
        assert_eq!(forced, RefreshOutcome::Refreshed { seq: 3 });
        assert_eq!(first.await.unwrap().unwrap(), RefreshOutcome::Refreshed { seq: 3 });

        // The slow, superseded fetch never published its empty snapshot.
        assert_eq!(store.current().unwrap().records.len(), 2);
        assert_eq!(store.latest_seq(), 3);
    }

    #[test]
    fn only_server_side_and_network_errors_are_retried() {
        assert!(is_transient(&SourceError::Status(503)));
        assert!(is_transient(&SourceError::Status(429)));
        assert!(!is_transient(&SourceError::Status(404)));
        assert!(!is_transient(&SourceError::Malformed("x".into())));
    }
}
