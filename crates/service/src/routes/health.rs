//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

/// Reports whether the broker connection is still up.
pub type BrokerProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// What the health check reports on.
#[derive(Clone)]
pub struct HealthState {
    /// Which stock store is in use: `postgres` or `memory`.
    pub store: &'static str,
    pub broker: BrokerProbe,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
    pub broker: &'static str,
}

/// GET /health: `200` while the broker connection is up, `503` otherwise.
pub async fn check(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let connected = (state.broker)();
    let (code, status, broker) = if connected {
        (StatusCode::OK, "ok", "connected")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded", "disconnected")
    };

    (
        code,
        Json(HealthResponse {
            status,
            store: state.store,
            broker,
        }),
    )
}
