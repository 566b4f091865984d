use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde_json::json;
use tracing::{error, info, warn};

use super::AppState;
use crate::models::BookingRequest;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/bookings", post(handler))
}

async fn handler(
    State(state): State<AppState>,
    Json(request): Json<BookingRequest>,
) -> impl IntoResponse {
    // ---
    let booking = match request.into_booking() {
        Ok(booking) => booking,
        Err(e) => {
            warn!("Rejected booking: {}", e);
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };

    match state.store.insert_booking(&booking).await {
        Ok(id) => {
            info!(
                "Booking {} created for {} at {}",
                id, booking.issue_type, booking.centre_name
            );
            (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
        }
        Err(e) => {
            error!("Failed to store booking: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to store booking" })),
            )
                .into_response()
        }
    }
}
