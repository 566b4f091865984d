use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde_json::json;
use tracing::{debug, info};

use super::AppState;
use crate::controller::SyncError;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/sync", post(handler))
}

/// Submit the selected sample; the status code tells the caller what to show.
async fn handler(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    info!("POST /sync");

    match state.controller.sync_selected().await {
        Ok(result) => {
            debug!("POST /sync - overall health {}", result.overall_health());
            (StatusCode::OK, Json(json!(result))).into_response()
        }
        Err(e) => {
            let status = match &e {
                SyncError::Busy | SyncError::SessionChanged => StatusCode::CONFLICT,
                SyncError::NoSamples => StatusCode::NOT_FOUND,
                SyncError::Prediction(_) => StatusCode::BAD_GATEWAY,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}
