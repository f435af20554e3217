use std::time::Duration;

use crate::error::{AppError, Result};

pub const INPLAY_URL: &str = "https://api.b365api.com/v3/events/inplay";
pub const ODDS_URL: &str = "https://api.b365api.com/v2/event/odds";

/// Credential value that switches the provider to canned in-memory data.
pub const DEMO_CREDENTIAL: &str = "DEMO_MODE";

/// Minimum spacing between the *start* of any two outbound upstream calls (seconds).
/// Global to the credential, not per endpoint.
pub const MIN_CALL_SPACING_SECS: u64 = 45;

/// Retries after an upstream 429 before giving up with `FetchError::RateLimited`.
pub const MAX_RETRIES: u32 = 3;

/// First backoff delay after a 429; doubles on every further attempt.
pub const RETRY_BASE_DELAY_MS: u64 = 2_000;

pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Client-side edge cache TTL. Must stay strictly below the call spacing.
pub const EDGE_CACHE_TTL_SECS: u64 = 40;

/// TTL applied by the built-in `/proxy` route.
pub const PROXY_CACHE_TTL_SECS: u64 = 60;

/// Default per-match refresh cadence.
pub const REFRESH_INTERVAL_MS: u64 = 45_000;

/// League names containing this marker (any case) are simulated fixtures.
pub const EXCLUDED_LEAGUE_MARKER: &str = "esoccer";

pub const ORACLE_TIMEOUT_SECS: u64 = 15;

/// Trailing window (match minutes) for momentum, shot cluster and pressure.
pub const ANALYSIS_WINDOW_MINUTES: u32 = 5;

/// Channel capacity for the background history writer.
pub const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct Config {
    /// Opaque provider token (UPSTREAM_CREDENTIAL). `DEMO_MODE` selects demo data.
    pub credential: String,
    pub inplay_url: String,
    pub odds_url: String,
    /// Optional pass-through proxy (PROXY_URL); requests become `PROXY_URL?target=<encoded>`.
    pub proxy_url: Option<String>,
    pub sport_id: u32,
    pub min_call_spacing: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub http_timeout: Duration,
    pub edge_cache_ttl: Duration,
    pub proxy_cache_ttl: Duration,
    pub refresh_interval: Duration,
    pub excluded_league_marker: String,
    /// Match ids tracked from startup (TRACKED_MATCHES, comma-separated).
    pub tracked_matches: Vec<String>,
    pub oracle_url: Option<String>,
    pub oracle_timeout: Duration,
    pub db_path: String,
    pub api_port: u16,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let min_call_spacing_secs = std::env::var("MIN_CALL_SPACING_SECS")
            .unwrap_or_else(|_| MIN_CALL_SPACING_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| {
                AppError::Config("MIN_CALL_SPACING_SECS must be a whole number of seconds".to_string())
            })?;
        let edge_cache_ttl_secs = std::env::var("EDGE_CACHE_TTL_SECS")
            .unwrap_or_else(|_| EDGE_CACHE_TTL_SECS.to_string())
            .parse::<u64>()
            .map_err(|_| {
                AppError::Config("EDGE_CACHE_TTL_SECS must be a whole number of seconds".to_string())
            })?;
        if edge_cache_ttl_secs >= min_call_spacing_secs {
            return Err(AppError::Config(format!(
                "MIN_CALL_SPACING_SECS ({min_call_spacing_secs}) must be strictly larger than EDGE_CACHE_TTL_SECS ({edge_cache_ttl_secs})"
            )));
        }

        Ok(Self {
            credential: std::env::var("UPSTREAM_CREDENTIAL")
                .unwrap_or_else(|_| DEMO_CREDENTIAL.to_string()),
            inplay_url: std::env::var("INPLAY_URL").unwrap_or_else(|_| INPLAY_URL.to_string()),
            odds_url: std::env::var("ODDS_URL").unwrap_or_else(|_| ODDS_URL.to_string()),
            proxy_url: std::env::var("PROXY_URL")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            sport_id: std::env::var("SPORT_ID")
                .unwrap_or_else(|_| "1".to_string())
                .parse::<u32>()
                .unwrap_or(1),
            min_call_spacing: Duration::from_secs(min_call_spacing_secs),
            max_retries: std::env::var("MAX_RETRIES")
                .unwrap_or_else(|_| MAX_RETRIES.to_string())
                .parse::<u32>()
                .unwrap_or(MAX_RETRIES),
            retry_base_delay: Duration::from_millis(
                std::env::var("RETRY_BASE_DELAY_MS")
                    .unwrap_or_else(|_| RETRY_BASE_DELAY_MS.to_string())
                    .parse::<u64>()
                    .unwrap_or(RETRY_BASE_DELAY_MS),
            ),
            http_timeout: Duration::from_secs(
                std::env::var("HTTP_TIMEOUT_SECS")
                    .unwrap_or_else(|_| HTTP_TIMEOUT_SECS.to_string())
                    .parse::<u64>()
                    .unwrap_or(HTTP_TIMEOUT_SECS),
            ),
            edge_cache_ttl: Duration::from_secs(edge_cache_ttl_secs),
            proxy_cache_ttl: Duration::from_secs(
                std::env::var("PROXY_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| PROXY_CACHE_TTL_SECS.to_string())
                    .parse::<u64>()
                    .unwrap_or(PROXY_CACHE_TTL_SECS),
            ),
            refresh_interval: Duration::from_millis(
                std::env::var("REFRESH_INTERVAL_MS")
                    .unwrap_or_else(|_| REFRESH_INTERVAL_MS.to_string())
                    .parse::<u64>()
                    .unwrap_or(REFRESH_INTERVAL_MS),
            ),
            excluded_league_marker: std::env::var("EXCLUDED_LEAGUE_MARKER")
                .unwrap_or_else(|_| EXCLUDED_LEAGUE_MARKER.to_string()),
            tracked_matches: std::env::var("TRACKED_MATCHES")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            oracle_url: std::env::var("ORACLE_URL")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            oracle_timeout: Duration::from_secs(
                std::env::var("ORACLE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| ORACLE_TIMEOUT_SECS.to_string())
                    .parse::<u64>()
                    .unwrap_or(ORACLE_TIMEOUT_SECS),
            ),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "engine.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}
