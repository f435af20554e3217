use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

/// Whether a transport failure most likely comes from a misconfigured proxy
/// sitting between us and the provider, or from the network in general.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkHint {
    Intermediary,
    Generic,
}

impl std::fmt::Display for NetworkHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkHint::Intermediary => write!(
                f,
                "check that the proxy URL is correct, deployed and forwarding the `target` parameter"
            ),
            NetworkHint::Generic => write!(f, "check network connectivity and DNS"),
        }
    }
}

/// Transport-level failures from the rate-limited fetcher.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("upstream rate limit still active after {attempts} attempts; wait before retrying")]
    RateLimited { attempts: u32 },

    #[error("upstream denied access (403); check the API credential or proxy configuration")]
    Forbidden,

    #[error("network failure: {detail} ({hint})")]
    Network { hint: NetworkHint, detail: String },

    #[error("upstream returned a non-JSON body: {0}")]
    InvalidPayload(String),

    #[error("upstream request timed out")]
    Timeout,
}

/// Domain-level failures from the provider client.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("upstream rejected the request: {0}")]
    UpstreamRejected(String),

    #[error("match {0} not found in the live listing")]
    NotFound(String),
}

/// Caller contract violations surfaced by the wager ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("stake must be a positive amount")]
    InvalidStake,

    #[error("price must be decimal odds greater than 1.0")]
    InvalidPrice,

    #[error("handicap line must be a multiple of 0.25")]
    InvalidHandicapLine,

    #[error("score must have the form H-A with two non-negative integers, got {0:?}")]
    InvalidScoreFormat(String),

    #[error("wager {0} is already settled")]
    AlreadySettled(String),

    #[error("wager {0} not found")]
    WagerNotFound(String),

    #[error("no live price for this market on match {0}")]
    MarketUnavailable(String),
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("oracle response was malformed: {0}")]
    Malformed(String),

    #[error("oracle timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        AppError::Provider(ProviderError::Fetch(e))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Validation(ValidationError::WagerNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Validation(ValidationError::AlreadySettled(_)) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Provider(ProviderError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Provider(ProviderError::Fetch(FetchError::RateLimited { .. })) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Provider(ProviderError::Fetch(FetchError::Timeout)) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
