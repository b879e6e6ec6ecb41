use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::lifecycle::Phase;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("service is shutting down")]
    ShuttingDown(Phase),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::ShuttingDown(phase) => {
                tracing::debug!(phase = %phase, "Rejecting request while shutting down");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
