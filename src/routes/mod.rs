//! HTTP route construction.
//!
//! The router is built explicitly at startup: health routes plus any extra
//! routes the caller supplies, all behind the drain gate and the request-id
//! span. Health responses are marked `no-store` so probes always hit the
//! process.

pub mod health;

use axum::{middleware, routing::get, Router};
use http::header::{HeaderValue, CACHE_CONTROL};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::CACHE_CONTROL_HEALTH;
use crate::middleware::{drain_layer, request_id_layer};
use crate::state::AppState;

/// Creates the Axum router with health routes and any additional routes.
pub fn create_router(state: AppState, extra_routes: Router<AppState>) -> Router {
    // Health checks - never cached, always fresh for liveness probes
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::ready))
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(CACHE_CONTROL_HEALTH),
        ));

    Router::new()
        .merge(health_routes)
        .merge(extra_routes)
        .with_state(state.clone())
        // Drain gate - refuses new requests once shutdown has begun
        .layer(middleware::from_fn_with_state(state, drain_layer))
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{HealthReport, HealthStatus};
    use crate::lifecycle::{Lifecycle, Phase};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state(phase: Phase) -> AppState {
        let lifecycle = Lifecycle::new();
        if phase != Phase::NotStarted {
            lifecycle.advance(phase).unwrap();
        }
        AppState::new("sub-manager", lifecycle)
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn report(response: axum::response::Response) -> HealthReport {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_up() {
        let app = create_router(state(Phase::Running), Router::new());
        let response = get(app, "/health").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CACHE_CONTROL], "no-store");
        let body = report(response).await;
        assert_eq!(body.status, HealthStatus::Up);
        assert_eq!(body.service, "sub-manager");
    }

    #[tokio::test]
    async fn test_health_up_before_registration() {
        let app = create_router(state(Phase::NotStarted), Router::new());
        let response = get(app, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_only_when_running() {
        let response = get(
            create_router(state(Phase::Running), Router::new()),
            "/health/ready",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(report(response).await.status, HealthStatus::Up);

        let response = get(
            create_router(state(Phase::NotStarted), Router::new()),
            "/health/ready",
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report(response).await.status, HealthStatus::Down);
    }

    #[tokio::test]
    async fn test_draining_rejects_with_503() {
        let app = create_router(state(Phase::Draining), Router::new());
        let response = get(app, "/health").await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "service is shutting down");
    }

    #[tokio::test]
    async fn test_request_id_generated() {
        let app = create_router(state(Phase::Running), Router::new());
        let response = get(app, "/health").await;
        let id = response.headers()["x-request-id"].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_request_id_propagated() {
        let app = create_router(state(Phase::Running), Router::new());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("x-request-id", "probe-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "probe-42");
    }

    #[tokio::test]
    async fn test_extra_routes_are_gated() {
        let extra = Router::new().route("/ping", axum::routing::get(|| async { "pong" }));
        let response = get(create_router(state(Phase::Running), extra.clone()), "/ping").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get(create_router(state(Phase::Stopped), extra), "/ping").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let app = create_router(state(Phase::Running), Router::new());
        let response = get(app, "/nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
