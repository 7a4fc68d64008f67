//! Health check handlers for load balancer and Kubernetes probes

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::constants::VERSION;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Serialize)]
struct SystemInfo {
    environment: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    system_info: SystemInfo,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    db: &'static str,
}

/// Liveness probe - reports status, environment and version.
pub async fn healthcheck(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "available",
            system_info: SystemInfo {
                environment: state.settings().env.as_str(),
                version: VERSION,
            },
        }),
    )
}

/// Readiness probe - returns OK if the database answers.
pub async fn ready(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    state.models().ping().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        AppError::Unavailable("database is not reachable".to_string())
    })?;

    Ok((
        StatusCode::OK,
        Json(ReadyResponse {
            status: "ok",
            db: "connected",
        }),
    ))
}

/// Fallback for unknown routes.
pub async fn not_found() -> AppError {
    AppError::NotFound("the requested resource could not be found".to_string())
}
