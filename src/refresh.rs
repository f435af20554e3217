use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::{advise, AdvisoryOracle, FeatureVector, Prediction};
use crate::api::health::HealthState;
use crate::config::{ANALYSIS_WINDOW_MINUTES, ORACLE_TIMEOUT_SECS};
use crate::db::{history_key, HistoryFlush, KvStore};
use crate::error::ProviderError;
use crate::provider::MatchFeed;
use crate::state::{MatchTimeSeries, TimeSeriesStore};
use crate::types::{Credential, MarketFamily, MatchSnapshot, OddsMarketSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Polling,
}

/// What a consumer may display about one tracked match.
#[derive(Debug, Clone, Serialize)]
pub struct MatchStatus {
    pub state: PollState,
    pub interval_ms: u64,
    pub last_error: Option<String>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub latest: Option<MatchSnapshot>,
    pub cycles: u64,
    pub skipped: u64,
    pub prediction: Option<Prediction>,
}

/// Result of asking for an immediate cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Completed,
    /// Another cycle for this match was already in flight.
    Skipped,
    NotTracked,
}

struct Tracked {
    interval: Duration,
    cancel: CancellationToken,
    in_flight: AtomicBool,
    status: Mutex<MatchStatus>,
}

impl Tracked {
    fn status(&self) -> MutexGuard<'_, MatchStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Held for the duration of one cycle; clears the in-flight flag on drop, so an
/// abandoned cycle never wedges the match.
struct InFlight(Arc<Tracked>);

impl InFlight {
    fn acquire(tracked: &Arc<Tracked>) -> Option<Self> {
        tracked
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(tracked)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.status().state = PollState::Idle;
        self.0.in_flight.store(false, Ordering::Release);
    }
}

/// Drives one polling loop per tracked match.
///
/// `start` runs a cycle immediately and then on every interval tick. A tick that
/// finds the previous cycle still running is dropped, not queued. `stop`
/// cancels future ticks; a cycle already in flight finishes but its results are
/// discarded.
pub struct RefreshScheduler {
    feed: Arc<dyn MatchFeed>,
    credential: Credential,
    store: Arc<TimeSeriesStore>,
    kv: Arc<dyn KvStore>,
    history_tx: mpsc::Sender<HistoryFlush>,
    health: Arc<HealthState>,
    oracle: Option<Arc<dyn AdvisoryOracle>>,
    oracle_timeout: Duration,
    analysis_window: u32,
    tracked: DashMap<String, Arc<Tracked>>,
    /// Matches whose persisted history has already been merged into the store.
    restored: DashSet<String>,
}

impl RefreshScheduler {
    pub fn new(
        feed: Arc<dyn MatchFeed>,
        credential: Credential,
        store: Arc<TimeSeriesStore>,
        kv: Arc<dyn KvStore>,
        history_tx: mpsc::Sender<HistoryFlush>,
        health: Arc<HealthState>,
    ) -> Self {
        Self {
            feed,
            credential,
            store,
            kv,
            history_tx,
            health,
            oracle: None,
            oracle_timeout: Duration::from_secs(ORACLE_TIMEOUT_SECS),
            analysis_window: ANALYSIS_WINDOW_MINUTES,
            tracked: DashMap::new(),
            restored: DashSet::new(),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn AdvisoryOracle>, timeout: Duration) -> Self {
        self.oracle = Some(oracle);
        self.oracle_timeout = timeout;
        self
    }

    /// Begin polling `match_id`. Returns `false` (and does nothing) if it is
    /// already tracked.
    pub fn start(self: &Arc<Self>, match_id: &str, every: Duration) -> bool {
        let every = every.max(Duration::from_millis(1));
        let tracked = Arc::new(Tracked {
            interval: every,
            cancel: CancellationToken::new(),
            in_flight: AtomicBool::new(false),
            status: Mutex::new(MatchStatus {
                state: PollState::Idle,
                interval_ms: every.as_millis() as u64,
                last_error: None,
                last_success_at: None,
                latest: None,
                cycles: 0,
                skipped: 0,
                prediction: None,
            }),
        });

        match self.tracked.entry(match_id.to_string()) {
            Entry::Occupied(_) => {
                debug!(match_id, "[REFRESH] already tracked; start ignored");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&tracked));
            }
        }

        info!(
            match_id,
            interval_ms = every.as_millis() as u64,
            "[REFRESH] tracking started (every {:.1}s)",
            every.as_secs_f64()
        );

        let this = Arc::clone(self);
        let id = match_id.to_string();
        tokio::spawn(async move { this.run(id, tracked).await });
        true
    }

    async fn run(self: Arc<Self>, match_id: String, tracked: Arc<Tracked>) {
        self.ensure_history(&match_id).await;

        let mut ticker = interval(tracked.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tracked.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match InFlight::acquire(&tracked) {
                        Some(guard) => {
                            let this = Arc::clone(&self);
                            let id = match_id.clone();
                            tokio::spawn(async move { this.cycle(&id, guard).await });
                        }
                        None => {
                            tracked.status().skipped += 1;
                            debug!(match_id = %match_id, "[REFRESH] previous cycle still running; tick dropped");
                        }
                    }
                }
            }
        }
        debug!(match_id = %match_id, "[REFRESH] loop stopped");
    }

    /// Stop polling. Idempotent; returns whether the match was tracked.
    pub fn stop(&self, match_id: &str) -> bool {
        match self.tracked.remove(match_id) {
            Some((_, tracked)) => {
                tracked.cancel.cancel();
                info!(match_id, "[REFRESH] tracking stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let ids: Vec<String> = self.tracked.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.stop(&id);
        }
    }

    /// Run one cycle now, subject to the same skip-if-busy rule as the timer.
    pub async fn refresh_now(&self, match_id: &str) -> RefreshOutcome {
        let Some(tracked) = self.tracked.get(match_id).map(|t| Arc::clone(t.value())) else {
            return RefreshOutcome::NotTracked;
        };
        match InFlight::acquire(&tracked) {
            Some(guard) => {
                self.cycle(match_id, guard).await;
                RefreshOutcome::Completed
            }
            None => {
                tracked.status().skipped += 1;
                RefreshOutcome::Skipped
            }
        }
    }

    pub fn status(&self, match_id: &str) -> Option<MatchStatus> {
        self.tracked.get(match_id).map(|t| t.status().clone())
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tracked.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Merge a match's persisted history into the store, once per match.
    ///
    /// Called before the first poll and by readers of untracked matches. A
    /// failed load is retried on the next call.
    pub async fn ensure_history(&self, match_id: &str) {
        if !self.restored.insert(match_id.to_string()) {
            return;
        }
        match self.kv.load(&history_key(match_id)).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<MatchTimeSeries>(&bytes) {
                Ok(series) => {
                    debug!(match_id, minutes = series.stats.len(), "[REFRESH] restored persisted history");
                    self.store.restore(match_id, series);
                }
                Err(e) => warn!(match_id, "[REFRESH] persisted history unreadable, ignoring: {e}"),
            },
            Ok(None) => {}
            Err(e) => {
                self.restored.remove(match_id);
                warn!(match_id, "[REFRESH] history load failed, starting empty: {e}");
            }
        }
    }

    async fn cycle(&self, match_id: &str, guard: InFlight) {
        let tracked = Arc::clone(&guard.0);
        tracked.status().state = PollState::Polling;

        let fetched = self.fetch(match_id).await;

        if tracked.cancel.is_cancelled() {
            debug!(match_id, "[REFRESH] match no longer tracked; discarding cycle result");
            return;
        }

        match fetched {
            Ok((snapshot, odds)) => self.apply(match_id, &tracked, snapshot, odds),
            Err(e) => self.report_failure(match_id, &tracked, &e),
        }
        drop(guard);
    }

    async fn fetch(
        &self,
        match_id: &str,
    ) -> Result<(MatchSnapshot, Result<Option<OddsMarketSet>, ProviderError>), ProviderError> {
        let snapshot = self
            .feed
            .event_detail(&self.credential, match_id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(match_id.to_string()))?;
        let odds = self.feed.event_odds(&self.credential, match_id).await;
        Ok((snapshot, odds))
    }

    fn apply(
        &self,
        match_id: &str,
        tracked: &Arc<Tracked>,
        snapshot: MatchSnapshot,
        odds: Result<Option<OddsMarketSet>, ProviderError>,
    ) {
        if snapshot.minute > 0 {
            self.store.record_stats(match_id, snapshot.minute, snapshot.stats);
        }

        let mut quotes = 0usize;
        let odds_error = match odds {
            Ok(Some(set)) => {
                for family in [MarketFamily::OverUnder, MarketFamily::Handicap] {
                    for quote in set.family(family) {
                        self.store.record_odds(match_id, family, *quote);
                        quotes += 1;
                    }
                }
                None
            }
            Ok(None) => None,
            Err(e) => Some(e),
        };

        {
            let mut status = tracked.status();
            status.cycles += 1;
            status.latest = Some(snapshot.clone());
            match &odds_error {
                None => {
                    status.last_success_at = Some(Utc::now());
                    status.last_error = None;
                }
                Some(e) => status.last_error = Some(format!("odds: {e}")),
            }
        }
        if let Some(e) = &odds_error {
            self.health.inc_refresh_failures();
            warn!(match_id, "[REFRESH] odds unavailable this cycle: {e}");
        }

        info!(
            match_id,
            minute = snapshot.minute,
            score = %snapshot.score,
            quotes,
            "[REFRESH] {} {} {} ({}')",
            snapshot.home_name,
            snapshot.score,
            snapshot.away_name,
            snapshot.minute,
        );

        if let Some(series) = self.store.snapshot(match_id) {
            let flush = HistoryFlush { match_id: match_id.to_string(), series };
            if let Err(e) = self.history_tx.try_send(flush) {
                warn!(match_id, "[REFRESH] history writer channel full: {e}");
            }
        }

        if odds_error.is_none() {
            self.spawn_oracle(&snapshot, tracked);
        }
    }

    fn report_failure(&self, match_id: &str, tracked: &Tracked, e: &ProviderError) {
        self.health.inc_refresh_failures();
        tracked.status().last_error = Some(e.to_string());
        warn!(match_id, "[REFRESH] cycle failed, next tick proceeds as scheduled: {e}");
    }

    fn spawn_oracle(&self, snapshot: &MatchSnapshot, tracked: &Arc<Tracked>) {
        let Some(oracle) = self.oracle.clone() else {
            return;
        };
        let features = FeatureVector::build(snapshot, &self.store, self.analysis_window);
        let timeout = self.oracle_timeout;
        let tracked = Arc::clone(tracked);
        tokio::spawn(async move {
            if let Some(p) = advise(oracle.as_ref(), &features, timeout).await {
                // A stopped session keeps no late answers.
                if !tracked.cancel.is_cancelled() {
                    tracked.status().prediction = Some(p);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::analysis::oracle::testing::StubOracle;
    use crate::analysis::oracle::ConfidenceLevel;
    use crate::db::kv_store::memory::MemoryKvStore;
    use crate::error::FetchError;
    use crate::types::{MarketPrices, MatchStats, OddsQuote, Score, StatPair};

    type Detail = Result<Option<MatchSnapshot>, ProviderError>;

    /// Feed that replays scripted detail results (then repeats the fallback)
    /// and counts detail calls.
    struct FakeFeed {
        script: Mutex<VecDeque<Detail>>,
        fallback: Detail,
        odds: Option<OddsMarketSet>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeFeed {
        fn new(fallback: Detail) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback,
                odds: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MatchFeed for FakeFeed {
        async fn list_live_events(&self, _: &Credential) -> Result<Vec<MatchSnapshot>, ProviderError> {
            Ok(Vec::new())
        }

        async fn event_detail(&self, _: &Credential, _: &str) -> Detail {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }

        async fn event_odds(
            &self,
            _: &Credential,
            _: &str,
        ) -> Result<Option<OddsMarketSet>, ProviderError> {
            Ok(self.odds.clone())
        }
    }

    fn snapshot(minute: u32) -> MatchSnapshot {
        MatchSnapshot {
            id: "m1".into(),
            league_name: "League".into(),
            home_name: "Home".into(),
            away_name: "Away".into(),
            score: Score::new(1, 0),
            minute,
            stats: MatchStats { corners: StatPair::new(minute, 0), ..MatchStats::default() },
        }
    }

    struct Harness {
        scheduler: Arc<RefreshScheduler>,
        feed: Arc<FakeFeed>,
        store: Arc<TimeSeriesStore>,
        kv: Arc<MemoryKvStore>,
        health: Arc<HealthState>,
        history_rx: mpsc::Receiver<HistoryFlush>,
    }

    fn harness(feed: FakeFeed) -> Harness {
        harness_with(feed, None)
    }

    fn harness_with(feed: FakeFeed, oracle: Option<Arc<dyn AdvisoryOracle>>) -> Harness {
        let feed = Arc::new(feed);
        let store = Arc::new(TimeSeriesStore::new());
        let kv = Arc::new(MemoryKvStore::new());
        let health = Arc::new(HealthState::new());
        let (tx, history_rx) = mpsc::channel(64);
        let mut scheduler = RefreshScheduler::new(
            feed.clone(),
            Credential::new("tok"),
            store.clone(),
            kv.clone(),
            tx,
            health.clone(),
        );
        if let Some(o) = oracle {
            scheduler = scheduler.with_oracle(o, Duration::from_secs(5));
        }
        Harness { scheduler: Arc::new(scheduler), feed, store, kv, health, history_rx }
    }

    const EVERY: Duration = Duration::from_secs(10);

    async fn settle_tasks() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_immediately_then_on_cadence() {
        let mut feed = FakeFeed::new(Ok(Some(snapshot(30))));
        feed.odds = Some(OddsMarketSet {
            over_under: vec![OddsQuote {
                minute: 30,
                handicap_line: dec!(2.5),
                prices: MarketPrices::OverUnder { over: Some(dec!(1.9)), under: Some(dec!(1.9)) },
            }],
            handicap: Vec::new(),
        });
        let h = harness(feed);

        assert!(h.scheduler.start("m1", EVERY));
        settle_tasks().await;
        assert_eq!(h.feed.calls(), 1);
        assert_eq!(h.store.stats_history("m1").len(), 1);
        assert_eq!(h.store.history("m1", MarketFamily::OverUnder).len(), 1);

        tokio::time::sleep(EVERY).await;
        assert_eq!(h.feed.calls(), 2);

        let status = h.scheduler.status("m1").unwrap();
        assert_eq!(status.cycles, 2);
        assert_eq!(status.state, PollState::Idle);
        assert!(status.last_error.is_none());
        assert!(status.last_success_at.is_some());
        assert_eq!(status.latest.unwrap().minute, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn forbidden_is_reported_and_polling_continues() {
        let feed = FakeFeed::new(Err(ProviderError::Fetch(FetchError::Forbidden)));
        let h = harness(feed);

        h.scheduler.start("m1", EVERY);
        tokio::time::sleep(EVERY * 2 + Duration::from_secs(5)).await;

        // Cycles at 0s, 10s and 20s: one detail call each, none retried.
        assert_eq!(h.feed.calls(), 3);
        assert_eq!(h.scheduler.tracked_ids(), vec!["m1".to_string()]);
        let status = h.scheduler.status("m1").unwrap();
        assert!(status.last_error.unwrap().contains("403"));
        assert_eq!(h.health.snapshot().refresh_failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_accumulated_history() {
        let feed = FakeFeed::new(Err(ProviderError::NotFound("m1".into())));
        feed.script.lock().unwrap().push_back(Ok(Some(snapshot(30))));
        let h = harness(feed);

        h.scheduler.start("m1", EVERY);
        tokio::time::sleep(EVERY + Duration::from_secs(1)).await;

        assert_eq!(h.feed.calls(), 2);
        assert_eq!(h.store.stats_history("m1").len(), 1);
        let status = h.scheduler.status("m1").unwrap();
        assert!(status.last_error.is_some());
        assert_eq!(status.latest.unwrap().minute, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_ticks_are_dropped_not_queued() {
        let mut feed = FakeFeed::new(Ok(Some(snapshot(40))));
        feed.delay = Duration::from_secs(25);
        let h = harness(feed);

        h.scheduler.start("m1", EVERY);
        tokio::time::sleep(Duration::from_secs(21)).await;
        // Ticks at 10s and 20s found the first cycle (0s to 25s) still running.
        assert_eq!(h.feed.calls(), 1);
        assert_eq!(h.scheduler.status("m1").unwrap().skipped, 2);
        assert_eq!(h.scheduler.status("m1").unwrap().state, PollState::Polling);
        assert_eq!(h.scheduler.refresh_now("m1").await, RefreshOutcome::Skipped);
        assert_eq!(h.scheduler.status("m1").unwrap().skipped, 3);

        // Finished at 25s; nothing was queued in the meantime.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(h.feed.calls(), 1);
        assert_eq!(h.scheduler.status("m1").unwrap().cycles, 1);

        // The 30s tick starts the next cycle.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(h.feed.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_cancels_future_ticks() {
        let h = harness(FakeFeed::new(Ok(Some(snapshot(10)))));

        h.scheduler.start("m1", EVERY);
        settle_tasks().await;
        assert!(h.scheduler.stop("m1"));
        assert!(!h.scheduler.stop("m1"));

        tokio::time::sleep(EVERY * 5).await;
        assert_eq!(h.feed.calls(), 1);
        assert!(h.scheduler.status("m1").is_none());
        assert_eq!(h.scheduler.refresh_now("m1").await, RefreshOutcome::NotTracked);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_match_discards_in_flight_result() {
        let mut feed = FakeFeed::new(Ok(Some(snapshot(55))));
        feed.delay = Duration::from_secs(5);
        let h = harness(feed);

        h.scheduler.start("m1", EVERY);
        settle_tasks().await;
        h.scheduler.stop("m1");
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(h.feed.calls(), 1);
        assert!(h.store.stats_history("m1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_a_no_op() {
        let h = harness(FakeFeed::new(Ok(Some(snapshot(10)))));
        assert!(h.scheduler.start("m1", EVERY));
        assert!(!h.scheduler.start("m1", Duration::from_secs(1)));
        settle_tasks().await;
        assert_eq!(h.feed.calls(), 1);
        assert_eq!(h.scheduler.status("m1").unwrap().interval_ms, 10_000);
        assert_eq!(h.scheduler.tracked_ids(), vec!["m1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn minute_zero_snapshot_records_no_stats() {
        let h = harness(FakeFeed::new(Ok(Some(snapshot(0)))));
        h.scheduler.start("m1", EVERY);
        settle_tasks().await;
        assert!(h.store.stats_history("m1").is_empty());
        assert_eq!(h.scheduler.status("m1").unwrap().cycles, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_flushed_and_restored() {
        let mut h = harness(FakeFeed::new(Ok(Some(snapshot(20)))));
        let mut persisted = MatchTimeSeries::default();
        persisted.stats.insert(5, MatchStats::default());
        h.kv.insert(&history_key("m1"), serde_json::to_vec(&persisted).unwrap());

        h.scheduler.start("m1", EVERY);
        settle_tasks().await;

        let minutes: Vec<u32> = h.store.stats_history("m1").iter().map(|(m, _)| *m).collect();
        assert_eq!(minutes, vec![5, 20]);

        let flush = h.history_rx.try_recv().unwrap();
        assert_eq!(flush.match_id, "m1");
        assert_eq!(flush.series.stats.len(), 2);
    }

    #[tokio::test]
    async fn untracked_history_is_restored_once_on_demand() {
        let h = harness(FakeFeed::new(Ok(None)));
        let mut persisted = MatchTimeSeries::default();
        persisted.stats.insert(8, MatchStats::default());
        persisted.stats.insert(9, MatchStats::default());
        h.kv.insert(&history_key("m4"), serde_json::to_vec(&persisted).unwrap());

        h.kv.fail_loads.store(true, Ordering::Relaxed);
        h.scheduler.ensure_history("m4").await;
        assert!(h.store.stats_history("m4").is_empty());

        h.kv.fail_loads.store(false, Ordering::Relaxed);
        h.scheduler.ensure_history("m4").await;
        let minutes: Vec<u32> = h.store.stats_history("m4").iter().map(|(m, _)| *m).collect();
        assert_eq!(minutes, vec![8, 9]);

        persisted.stats.insert(10, MatchStats::default());
        h.kv.insert(&history_key("m4"), serde_json::to_vec(&persisted).unwrap());
        h.scheduler.ensure_history("m4").await;
        assert_eq!(h.store.stats_history("m4").len(), 2);
        assert!(h.scheduler.status("m4").is_none());
        assert_eq!(h.feed.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_now_runs_a_cycle_when_idle() {
        let h = harness(FakeFeed::new(Ok(Some(snapshot(12)))));
        h.scheduler.start("m1", Duration::from_secs(600));
        settle_tasks().await;
        assert_eq!(h.scheduler.refresh_now("m1").await, RefreshOutcome::Completed);
        assert_eq!(h.feed.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn oracle_answer_lands_on_status() {
        let oracle = Arc::new(StubOracle::answering(Prediction {
            probability: 61,
            confidence_level: ConfidenceLevel::High,
            reasoning: "corners piling up".into(),
        }));
        let h = harness_with(
            FakeFeed::new(Ok(Some(snapshot(70)))),
            Some(oracle.clone() as Arc<dyn AdvisoryOracle>),
        );

        h.scheduler.start("m1", EVERY);
        settle_tasks().await;

        assert_eq!(oracle.calls(), 1);
        let prediction = h.scheduler.status("m1").unwrap().prediction.unwrap();
        assert_eq!(prediction.probability, 61);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_oracle_does_not_disturb_refresh() {
        let oracle = Arc::new(StubOracle::failing());
        let h = harness_with(
            FakeFeed::new(Ok(Some(snapshot(70)))),
            Some(oracle.clone() as Arc<dyn AdvisoryOracle>),
        );

        h.scheduler.start("m1", EVERY);
        settle_tasks().await;

        let status = h.scheduler.status("m1").unwrap();
        assert!(status.prediction.is_none());
        assert!(status.last_error.is_none());
        assert_eq!(status.cycles, 1);
    }
}
