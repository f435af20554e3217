use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analysis::{api_chart, ApiPoint};
use crate::api::health::{HealthSnapshot, HealthState};
use crate::api::latency::LatencyStats;
use crate::error::{AppError, ValidationError};
use crate::ledger::WagerLedger;
use crate::provider::MatchFeed;
use crate::refresh::{MatchStatus, RefreshOutcome, RefreshScheduler};
use crate::state::TimeSeriesStore;
use crate::types::{
    Credential, MarketFamily, MarketType, MatchSnapshot, MatchStats, OddsQuote, Wager,
};

#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Arc<RefreshScheduler>,
    pub feed: Arc<dyn MatchFeed>,
    pub credential: Credential,
    pub store: Arc<TimeSeriesStore>,
    pub ledger: Arc<WagerLedger>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub default_interval: Duration,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .route("/matches", get(get_matches))
        .route("/matches/:id/track", post(track_match).delete(untrack_match))
        .route("/matches/:id/refresh", post(refresh_match))
        .route("/matches/:id/status", get(get_match_status))
        .route("/matches/:id/history", get(get_match_history))
        .route("/matches/:id/wagers", get(get_wagers).post(place_wager))
        .route("/wagers/:id/settle", post(settle_wager))
        .route("/wagers/:id", axum::routing::delete(delete_wager))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct TrackQuery {
    pub interval_ms: Option<u64>,
}

/// Explicit terms when both `handicap_line` and `price` are given, otherwise
/// the latest stored quote for the market.
///
/// Every line is read from the backed side. Handicap quotes are stored home
/// relative, so an AWAY wager placed at market gets the negated line: a home
/// quote of -0.75 becomes an AWAY wager at +0.75. An explicit AWAY line is
/// taken as already away relative.
#[derive(Debug, Deserialize)]
pub struct PlaceWagerRequest {
    pub market_type: MarketType,
    pub stake: Decimal,
    pub handicap_line: Option<Decimal>,
    pub price: Option<Decimal>,
    /// Score at placement; defaults to the latest polled score.
    pub score: Option<String>,
}

#[derive(Deserialize)]
pub struct SettleRequest {
    pub final_score: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub tracked_matches: usize,
    #[serde(flatten)]
    pub counters: HealthSnapshot,
}

#[derive(Serialize)]
pub struct StatsPoint {
    pub minute: u32,
    pub stats: MatchStats,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub match_id: String,
    pub stats: Vec<StatsPoint>,
    pub over_under: Vec<OddsQuote>,
    pub handicap: Vec<OddsQuote>,
    pub api_chart: Vec<ApiPoint>,
}

#[derive(Serialize)]
pub struct WagersResponse {
    pub match_id: String,
    pub total_profit: Decimal,
    pub wagers: Vec<Wager>,
}

#[derive(Debug, PartialEq)]
enum Terms {
    Explicit { line: Decimal, price: Decimal },
    AtMarket,
}

fn resolve_terms(req: &PlaceWagerRequest) -> Result<Terms, ValidationError> {
    match (req.handicap_line, req.price) {
        (Some(line), Some(price)) => Ok(Terms::Explicit { line, price }),
        (None, None) => Ok(Terms::AtMarket),
        (Some(_), None) => Err(ValidationError::InvalidPrice),
        (None, Some(_)) => Err(ValidationError::InvalidHandicapLine),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        tracked_matches: state.scheduler.tracked_ids().len(),
        counters: state.health.snapshot(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let (p50, p95, p99) = state.latency.percentiles();
    Json(serde_json::json!({
        "samples": state.latency.len(),
        "p50_ms": p50,
        "p95_ms": p95,
        "p99_ms": p99,
    }))
}

async fn get_matches(State(state): State<ApiState>) -> Result<Json<Vec<MatchSnapshot>>, AppError> {
    let events = state.feed.list_live_events(&state.credential).await?;
    Ok(Json(events))
}

async fn track_match(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
    Query(params): Query<TrackQuery>,
) -> Json<serde_json::Value> {
    let every = params
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or(state.default_interval);
    state.ledger.load(&match_id).await;
    let started = state.scheduler.start(&match_id, every);
    Json(serde_json::json!({
        "match_id": match_id,
        "started": started,
        "interval_ms": every.as_millis() as u64,
    }))
}

async fn untrack_match(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
) -> Json<serde_json::Value> {
    let stopped = state.scheduler.stop(&match_id);
    Json(serde_json::json!({ "match_id": match_id, "stopped": stopped }))
}

async fn refresh_match(State(state): State<ApiState>, Path(match_id): Path<String>) -> Response {
    let outcome = state.scheduler.refresh_now(&match_id).await;
    let code = match outcome {
        RefreshOutcome::Completed => StatusCode::OK,
        RefreshOutcome::Skipped => StatusCode::CONFLICT,
        RefreshOutcome::NotTracked => StatusCode::NOT_FOUND,
    };
    (code, Json(serde_json::json!({ "match_id": match_id, "outcome": outcome }))).into_response()
}

async fn get_match_status(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
) -> Result<Json<MatchStatus>, StatusCode> {
    state.scheduler.status(&match_id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn get_match_history(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
) -> Json<HistoryResponse> {
    state.scheduler.ensure_history(&match_id).await;
    let stats = state.store.stats_history(&match_id);
    Json(HistoryResponse {
        api_chart: api_chart(&stats),
        stats: stats
            .into_iter()
            .map(|(minute, stats)| StatsPoint { minute, stats })
            .collect(),
        over_under: state.store.history(&match_id, MarketFamily::OverUnder),
        handicap: state.store.history(&match_id, MarketFamily::Handicap),
        match_id,
    })
}

async fn get_wagers(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
) -> Json<WagersResponse> {
    let wagers = state.ledger.wagers(&match_id).await;
    let total_profit = state.ledger.total_profit(&match_id).await;
    Json(WagersResponse { match_id, total_profit, wagers })
}

async fn place_wager(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
    Json(req): Json<PlaceWagerRequest>,
) -> Result<(StatusCode, Json<Wager>), AppError> {
    let terms = resolve_terms(&req)?;
    let score = match &req.score {
        Some(s) => s.clone(),
        None => state
            .scheduler
            .status(&match_id)
            .and_then(|s| s.latest)
            .map(|snap| snap.score.to_string())
            .ok_or_else(|| ValidationError::MarketUnavailable(match_id.clone()))?,
    };

    let wager = match terms {
        Terms::Explicit { line, price } => {
            state
                .ledger
                .place(&match_id, req.market_type, line, price, req.stake, &score)
                .await?
        }
        Terms::AtMarket => {
            state
                .ledger
                .place_at_market(&match_id, req.market_type, req.stake, &state.store, &score)
                .await?
        }
    };
    Ok((StatusCode::CREATED, Json(wager)))
}

async fn settle_wager(
    State(state): State<ApiState>,
    Path(wager_id): Path<String>,
    Json(req): Json<SettleRequest>,
) -> Result<Json<Wager>, AppError> {
    let wager = state.ledger.settle(&wager_id, &req.final_score).await?;
    Ok(Json(wager))
}

async fn delete_wager(
    State(state): State<ApiState>,
    Path(wager_id): Path<String>,
) -> Result<Json<Wager>, AppError> {
    let wager = state.ledger.delete(&wager_id).await?;
    Ok(Json(wager))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn request(line: Option<Decimal>, price: Option<Decimal>) -> PlaceWagerRequest {
        PlaceWagerRequest {
            market_type: MarketType::Over,
            stake: dec!(10),
            handicap_line: line,
            price,
            score: None,
        }
    }

    #[test]
    fn terms_are_explicit_only_when_complete() {
        assert_eq!(
            resolve_terms(&request(Some(dec!(2.5)), Some(dec!(1.9)))),
            Ok(Terms::Explicit { line: dec!(2.5), price: dec!(1.9) })
        );
        assert_eq!(resolve_terms(&request(None, None)), Ok(Terms::AtMarket));
        assert_eq!(
            resolve_terms(&request(Some(dec!(2.5)), None)),
            Err(ValidationError::InvalidPrice)
        );
        assert_eq!(
            resolve_terms(&request(None, Some(dec!(1.9)))),
            Err(ValidationError::InvalidHandicapLine)
        );
    }

    #[test]
    fn place_request_reads_decimal_strings_and_numbers() {
        let req: PlaceWagerRequest = serde_json::from_str(
            r#"{"market_type":"AWAY","stake":"25","handicap_line":-0.25,"price":"1.95"}"#,
        )
        .unwrap();
        assert_eq!(req.market_type, MarketType::Away);
        assert_eq!(req.handicap_line, Some(dec!(-0.25)));
        assert_eq!(req.price, Some(dec!(1.95)));
        assert!(req.score.is_none());
    }
}
