//! Health check endpoints for container orchestration and service discovery.
//!
//! `/health` is the liveness probe: it answers `UP` whenever the process can
//! serve HTTP at all, and a missing answer is the caller's signal for `DOWN`.
//! `/health/ready` is the readiness probe: `UP` only while the service is
//! registered and running.

use axum::{extract::State, http::StatusCode, Json};

use crate::health::{HealthReport, HealthStatus};
use crate::lifecycle::Phase;
use crate::state::AppState;

/// Liveness handler.
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.reporter.report())
}

/// Readiness handler.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    match state.lifecycle.current() {
        Phase::Running => (StatusCode::OK, Json(state.reporter.report())),
        _ => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(state.reporter.report_with(HealthStatus::Down)),
        ),
    }
}
