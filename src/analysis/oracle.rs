//! Optional advisory oracle: feature vector in, goal probability out.
//! Purely additive. Nothing in refresh or settlement waits on it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::features::FeatureVector;
use crate::error::OracleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
    #[serde(alias = "very high", alias = "VERY_HIGH")]
    VeryHigh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Goal probability, 0-100.
    #[serde(alias = "goal_probability")]
    pub probability: u8,
    #[serde(alias = "confidence_level")]
    pub confidence_level: ConfidenceLevel,
    #[serde(default)]
    pub reasoning: String,
}

#[async_trait]
pub trait AdvisoryOracle: Send + Sync {
    /// Oracle name for logging.
    fn name(&self) -> &'static str;

    async fn predict(&self, features: &FeatureVector) -> Result<Prediction, OracleError>;
}

/// POSTs the feature vector as JSON and reads a [`Prediction`] back.
pub struct HttpOracle {
    client: reqwest::Client,
    url: String,
}

impl HttpOracle {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl AdvisoryOracle for HttpOracle {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn predict(&self, features: &FeatureVector) -> Result<Prediction, OracleError> {
        let body = self
            .client
            .post(&self.url)
            .json(features)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        parse_prediction(&body)
    }
}

pub fn parse_prediction(body: &[u8]) -> Result<Prediction, OracleError> {
    let prediction: Prediction =
        serde_json::from_slice(body).map_err(|e| OracleError::Malformed(e.to_string()))?;
    if prediction.probability > 100 {
        return Err(OracleError::Malformed(format!(
            "probability {} outside 0-100",
            prediction.probability
        )));
    }
    Ok(prediction)
}

/// Ask the oracle with a hard deadline. Every failure is logged and becomes `None`.
pub async fn advise(
    oracle: &dyn AdvisoryOracle,
    features: &FeatureVector,
    timeout: Duration,
) -> Option<Prediction> {
    let result = match tokio::time::timeout(timeout, oracle.predict(features)).await {
        Ok(r) => r,
        Err(_) => Err(OracleError::Timeout),
    };
    match result {
        Ok(p) => {
            debug!(
                match_id = %features.match_id,
                oracle = oracle.name(),
                probability = p.probability,
                "[ORACLE] {}% ({:?})",
                p.probability,
                p.confidence_level,
            );
            Some(p)
        }
        Err(e) => {
            warn!(match_id = %features.match_id, oracle = oracle.name(), "[ORACLE] ignored: {e}");
            None
        }
    }
}
