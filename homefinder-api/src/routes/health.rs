use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use homefinder_shared::types::api::{HealthResponse, HealthStatus};

use crate::AppState;

/// GET /health - liveness plus a pool check so a dead database shows up
/// as degraded instead of healthy.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut response = HealthResponse::healthy("homefinder-api", env!("CARGO_PKG_VERSION"));
    if state.db.get().is_err() {
        response.status = HealthStatus::Degraded;
    }
    Json(response)
}
