//! Sample list and selection endpoints.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use super::AppState;
use crate::controller::{DashboardSnapshot, SampleListView};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/samples", get(list))
        .route("/samples/reload", post(reload))
        .route("/samples/next", post(next))
        .route("/dashboard", get(dashboard))
}

async fn list(State(state): State<AppState>) -> Json<SampleListView> {
    Json(state.controller.sample_list().await)
}

async fn reload(State(state): State<AppState>) -> Json<SampleListView> {
    // ---
    let count = state.controller.reload().await;
    info!("POST /samples/reload - {} samples", count);
    Json(state.controller.sample_list().await)
}

async fn next(State(state): State<AppState>) -> Json<SampleListView> {
    state.controller.next_sample().await;
    Json(state.controller.sample_list().await)
}

async fn dashboard(State(state): State<AppState>) -> Json<DashboardSnapshot> {
    Json(state.controller.snapshot().await)
}
