//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Free slots in the side-effect pool.
    pub pool_available: usize,
    pub pool_capacity: usize,
    pub va_provider: Option<&'static str>,
}

/// GET /health
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pool_available: state.pool.available_permits(),
        pool_capacity: state.pool.max_concurrent(),
        va_provider: state.va_provider.map(|p| p.as_str()),
    })
}
