//! Client for the remote health-prediction endpoint.
//!
//! One POST per call, no retry and no timeout beyond reqwest's defaults. A
//! response is accepted only when it carries all three components.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{ComponentHealth, PredictionResult};
use crate::normalize::FlattenedPayload;

// ---

#[derive(Debug, Error)]
pub enum PredictError {
    // ---
    #[error("prediction request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("prediction endpoint returned HTTP {0}")]
    Status(StatusCode),

    #[error("prediction response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("prediction response is missing `{0}`")]
    MissingComponent(&'static str),
}

/// Request envelope: `{"data": <payload>}`.
#[derive(Serialize)]
struct PredictRequest<'a> {
    data: &'a FlattenedPayload,
}

/// Response as sent; a component may be absent or `null` on failure.
#[derive(Deserialize)]
struct RawPrediction {
    engine: Option<ComponentHealth>,
    battery: Option<ComponentHealth>,
    brake: Option<ComponentHealth>,
}

#[derive(Debug, Clone)]
pub struct PredictionClient {
    client: reqwest::Client,
    endpoint: String,
}

impl PredictionClient {
    // ---
    /// `base_url` is the service root; requests go to `<base_url>/predict`.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        let endpoint = format!("{}/predict", base_url.trim_end_matches('/'));
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn predict(
        &self,
        payload: &FlattenedPayload,
    ) -> Result<PredictionResult, PredictError> {
        // ---
        info!("POST {} with {} fields", self.endpoint, payload.len());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&PredictRequest { data: payload })
            .send()
            .await?;

        let status = response.status();
        debug!("Prediction response status: {}", status);
        if !status.is_success() {
            return Err(PredictError::Status(status));
        }

        let body = response.bytes().await?;
        let result = parse_prediction(&body)?;
        debug!(
            "Prediction healths: engine={} battery={} brake={}",
            result.engine.health_percent,
            result.battery.health_percent,
            result.brake.health_percent
        );
        Ok(result)
    }
}

/// Decode a response body, rejecting any body that lacks a component.
pub fn parse_prediction(body: &[u8]) -> Result<PredictionResult, PredictError> {
    // ---
    let raw: RawPrediction = serde_json::from_slice(body)?;
    Ok(PredictionResult {
        engine: raw.engine.ok_or(PredictError::MissingComponent("engine"))?,
        battery: raw.battery.ok_or(PredictError::MissingComponent("battery"))?,
        brake: raw.brake.ok_or(PredictError::MissingComponent("brake"))?,
    })
}
