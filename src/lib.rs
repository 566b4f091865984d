//! Headless vehicle-diagnostics client.
//!
//! Resolves the OBD sample assigned to the signed-in user, flattens it into
//! the prediction service's payload shape, submits it, and keeps the returned
//! engine/battery/brake health for display. Module boundaries follow the
//! Explicit Module Boundary Pattern (EMBP): each module exposes a small
//! surface and this file is the only gateway between them and the binary.

pub mod cache;
pub mod config;
pub mod controller;
pub mod models;
pub mod normalize;
pub mod predict;
pub mod resolver;
pub mod routes;
pub mod schema;
pub mod session;
pub mod store;

pub use config::Config;
pub use controller::{DiagnosticsController, SyncError, SyncSettings};
pub use models::{ComponentHealth, PredictionResult, Sample};
pub use normalize::{normalize, FlattenedPayload, PayloadDefaults};
pub use predict::{PredictError, PredictionClient};
pub use resolver::{ResolvedSamples, SampleResolver};
pub use session::{SessionState, User};
