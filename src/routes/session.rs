use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::AppState;
use crate::session::User;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/session/sign-in", post(sign_in))
        .route("/session/sign-up", post(sign_up))
        .route("/session/sign-out", post(sign_out))
}

/// Identity already verified by the external auth provider.
#[derive(Debug, Deserialize)]
struct SessionRequest {
    uid: String,
    email: Option<String>,
}

impl From<SessionRequest> for User {
    fn from(req: SessionRequest) -> Self {
        User {
            uid: req.uid,
            email: req.email,
        }
    }
}

async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> impl IntoResponse {
    // ---
    match state.controller.session().sign_in(request.into()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Sign-in failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to persist session" })),
            )
                .into_response()
        }
    }
}

async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> impl IntoResponse {
    // ---
    let session = state.controller.session();
    match session.sign_up(request.into(), state.store.as_ref()).await {
        Ok(assigned) => {
            (StatusCode::CREATED, Json(json!({ "assigned_sample": assigned }))).into_response()
        }
        Err(e) => {
            error!("Sign-up failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn sign_out(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    if let Err(e) = state.controller.session().sign_out().await {
        error!("Sign-out did not clear the local cache: {:#}", e);
    }
    StatusCode::NO_CONTENT
}
