//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub compiler: CompilerHealth,
    pub cache: CacheHealth,
}

#[derive(Debug, Serialize)]
pub struct CompilerHealth {
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct CacheHealth {
    pub enabled: bool,
    pub entries: usize,
    pub in_flight: usize,
    pub max_concurrent: usize,
}

/// Simple status response for liveness/readiness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Full health check.
///
/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let controller = state.service.controller();
    let stats = controller.stats().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        compiler: CompilerHealth {
            backend: state.service.compiler_backend().to_string(),
        },
        cache: CacheHealth {
            enabled: state.config.cache.enabled,
            entries: stats.store.entries,
            in_flight: stats.in_flight,
            max_concurrent: controller.settings().max_concurrent,
        },
    })
}

/// Liveness probe. 200 while the process runs.
///
/// GET /api/health/live
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe. 503 while every generation slot is taken.
///
/// GET /api/health/ready
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    let controller = state.service.controller();
    if controller.in_flight_count() >= controller.settings().max_concurrent {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }
    Ok(Json(StatusResponse {
        status: "ready".to_string(),
    }))
}
