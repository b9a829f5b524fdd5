use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use distqueue_common::DistQueueError;
use serde_json::json;

/// Thin wrapper turning a `DistQueueError` into an HTTP response, grounded
/// in `gator-cli`'s `AppError` — schema/validation problems become 4xx,
/// everything else a 500, never a panic.
pub struct ApiError(pub DistQueueError);

impl From<DistQueueError> for ApiError {
    fn from(err: DistQueueError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            DistQueueError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            DistQueueError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            DistQueueError::Serialization(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::warn!(error = %self.0, "rejected request");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
