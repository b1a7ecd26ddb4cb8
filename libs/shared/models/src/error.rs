use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream service unavailable: {message}")]
    UpstreamUnavailable { message: String, details: String },
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// JSON body: `error` always, `details` when there is an underlying cause.
    pub fn body(&self) -> serde_json::Value {
        match self {
            AppError::Internal(details) => json!({
                "error": "Internal server error",
                "details": details
            }),
            AppError::Database(details) => json!({
                "error": "Database error",
                "details": details
            }),
            AppError::UpstreamUnavailable { message, details } => json!({
                "error": message,
                "details": details
            }),
            AppError::Auth(msg)
            | AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::ValidationError(msg)
            | AppError::Conflict(msg) => json!({ "error": msg }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        tracing::error!("Error: {}: {}", status, self);

        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_errors_have_no_details() {
        let body = AppError::NotFound("Patient not found".to_string()).body();
        assert_eq!(body["error"], "Patient not found");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_upstream_error_maps_to_bad_gateway_with_details() {
        let err = AppError::UpstreamUnavailable {
            message: "Failed to fetch calendar events".to_string(),
            details: "HTTP 503: backend error".to_string(),
        };

        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        let body = err.body();
        assert_eq!(body["error"], "Failed to fetch calendar events");
        assert_eq!(body["details"], "HTTP 503: backend error");
    }

    #[tokio::test]
    async fn test_database_error_response() {
        let response = AppError::Database("connection reset".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Database error");
        assert_eq!(body["details"], "connection reset");
    }
}
