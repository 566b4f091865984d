use std::sync::Arc;

use axum::Router;

use crate::controller::DiagnosticsController;
use crate::store::DocumentStore;

mod bookings;
mod health;
mod samples;
mod session;
mod sync;

// ---

/// Shared state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<DiagnosticsController>,
    pub store: Arc<dyn DocumentStore>,
}

pub fn router(controller: Arc<DiagnosticsController>, store: Arc<dyn DocumentStore>) -> Router {
    // ---
    Router::new()
        .merge(samples::router())
        .merge(sync::router())
        .merge(bookings::router())
        .merge(session::router())
        .merge(health::router())
        .with_state(AppState { controller, store })
}
