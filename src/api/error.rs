//! API errors rendered as `{success: false, error}` JSON.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::api::types::ErrorResponse;
use crate::pipeline::InferenceError;

/// Request-level failures. Every variant answers 500 so clients only need
/// to check `success`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("Invalid upload: {0}")]
    BadUpload(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Inference(InferenceError::Runtime(detail)) => {
                tracing::error!(detail, "Inference failed");
                self.to_string()
            }
            ApiError::Inference(InferenceError::Decode(detail)) => {
                tracing::warn!(detail, "Rejected upload");
                self.to_string()
            }
            ApiError::BadUpload(detail) => {
                tracing::warn!(detail, "Rejected upload");
                self.to_string()
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                "An internal error occurred".to_string()
            }
        };

        let body = ErrorResponse {
            success: false,
            error: message,
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn decode_error_returns_500_with_message() {
        let err: ApiError = InferenceError::Decode("unsupported or corrupt image".into()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(
            json["error"],
            "Cannot decode image: unsupported or corrupt image"
        );
    }

    #[tokio::test]
    async fn runtime_error_returns_500() {
        let err: ApiError = InferenceError::Runtime("no gradient".into()).into();
        let json = body_json(err.into_response()).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Inference failed: no gradient");
    }

    #[tokio::test]
    async fn bad_upload_returns_500() {
        let response = ApiError::BadUpload("no file field".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid upload: no file field");
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("task panicked".into()).into_response();
        let json = body_json(response).await;
        assert_eq!(json["error"], "An internal error occurred");
    }
}
