mod analysis;
mod api;
mod clock;
mod config;
mod db;
mod error;
mod fetcher;
mod ledger;
mod provider;
mod refresh;
mod state;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::{AdvisoryOracle, HttpOracle};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::proxy::{self, EdgeProxy};
use crate::api::routes::{router, ApiState};
use crate::clock::{Clock, TokioClock};
use crate::config::{Config, CHANNEL_CAPACITY};
use crate::db::{HistoryWriter, KvStore, SqliteKvStore};
use crate::error::Result;
use crate::fetcher::{RateGate, RateLimitedFetcher, ReqwestTransport, RetryPolicy, Transport};
use crate::ledger::WagerLedger;
use crate::provider::{MatchFeed, ProviderClient, ProviderSettings};
use crate::refresh::RefreshScheduler;
use crate::state::{EdgeCache, TimeSeriesStore};
use crate::types::Credential;

/// How often expired entries are swept from the client and proxy caches.
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", cfg.db_path)).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);
    let kv: Arc<dyn KvStore> = Arc::new(SqliteKvStore::new(pool));

    let (history_tx, history_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let writer = HistoryWriter::new(Arc::clone(&kv), history_rx);
    tokio::spawn(async move { writer.run().await });

    // --- Upstream stack: gate → fetcher → cache → provider ---
    let clock: Arc<dyn Clock> = Arc::new(TokioClock);
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());
    let credential = Credential::new(cfg.credential.clone());
    if credential.is_demo() {
        info!("[CONFIG] demo credential configured; serving canned match data");
    } else if credential.is_empty() {
        warn!("[CONFIG] UPSTREAM_CREDENTIAL is empty; listings will be empty");
    }
    if let Some(proxy_url) = &cfg.proxy_url {
        info!("[CONFIG] routing upstream calls through {proxy_url}");
    }

    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new(cfg.proxy_url.clone(), cfg.http_timeout)?);
    let gate = Arc::new(RateGate::new(cfg.min_call_spacing, Arc::clone(&clock)));
    let fetcher = Arc::new(RateLimitedFetcher::new(
        transport,
        gate,
        Arc::clone(&clock),
        RetryPolicy {
            max_retries: cfg.max_retries,
            base_delay: cfg.retry_base_delay,
        },
        Arc::clone(&health),
        Arc::clone(&latency),
    ));
    let edge_cache = Arc::new(EdgeCache::new(Arc::clone(&clock)));
    let provider = Arc::new(ProviderClient::new(
        ProviderSettings::from_config(&cfg),
        fetcher,
        Arc::clone(&edge_cache),
        Arc::clone(&clock),
        Arc::clone(&health),
    ));
    let feed: Arc<dyn MatchFeed> = provider;

    // --- Edge proxy (direct transport, own cache) ---
    let proxy_transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new(None, cfg.http_timeout)?);
    let edge_proxy = Arc::new(EdgeProxy::new(
        proxy_transport,
        EdgeCache::new(Arc::clone(&clock)),
        cfg.proxy_cache_ttl,
    ));

    let purge_cache = Arc::clone(&edge_cache);
    let purge_proxy = Arc::clone(&edge_proxy);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = purge_cache.purge_expired();
            if removed > 0 {
                debug!(removed, remaining = purge_cache.len(), "[CACHE] purged expired entries");
            }
            let removed = purge_proxy.purge_expired();
            if removed > 0 {
                debug!(removed, remaining = purge_proxy.cached_len(), "[PROXY] purged expired entries");
            }
        }
    });

    // --- Domain state ---
    let store = Arc::new(TimeSeriesStore::new());
    let ledger = Arc::new(WagerLedger::new(Arc::clone(&kv)));

    let mut scheduler = RefreshScheduler::new(
        Arc::clone(&feed),
        credential.clone(),
        Arc::clone(&store),
        Arc::clone(&kv),
        history_tx,
        Arc::clone(&health),
    );
    if let Some(url) = &cfg.oracle_url {
        let oracle: Arc<dyn AdvisoryOracle> =
            Arc::new(HttpOracle::new(url.clone(), cfg.oracle_timeout)?);
        info!("[ORACLE] advisory predictions enabled ({url})");
        scheduler = scheduler.with_oracle(oracle, cfg.oracle_timeout);
    }
    let scheduler = Arc::new(scheduler);

    // --- Bootstrap listing (informational only) ---
    match feed.list_live_events(&credential).await {
        Ok(events) => {
            info!("Bootstrap complete: {} live events", events.len());
            for e in events.iter().take(10) {
                info!(
                    "[BOOTSTRAP]   {} | {} {} {} ({}') | {}",
                    e.id, e.home_name, e.score, e.away_name, e.minute, e.league_name
                );
            }
        }
        Err(e) => warn!("[BOOTSTRAP] live listing unavailable, continuing: {e}"),
    }

    for match_id in &cfg.tracked_matches {
        ledger.load(match_id).await;
        scheduler.start(match_id, cfg.refresh_interval);
    }
    if cfg.tracked_matches.is_empty() {
        info!("TRACKED_MATCHES not set; use POST /matches/:id/track to start polling");
    }

    // --- HTTP API server ---
    let api_state = ApiState {
        scheduler: Arc::clone(&scheduler),
        feed,
        credential,
        store,
        ledger,
        health,
        latency,
        default_interval: cfg.refresh_interval,
    };
    let app = router(api_state).merge(proxy::router(edge_proxy));
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C after stopping every polling session.
async fn shutdown_signal(scheduler: Arc<RefreshScheduler>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C, serving until killed: {e}");
        std::future::pending::<()>().await;
    }
    let tracked = scheduler.tracked_ids().len();
    scheduler.stop_all();
    info!(tracked, "[SHUTDOWN] stopped {tracked} polling sessions");
}
