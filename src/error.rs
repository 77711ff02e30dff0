/// Unified error types for the IAM service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::approval::ApprovalOutcome;

/// Main error type for the IAM service
#[derive(Error, Debug)]
pub enum IamError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (unique constraint hit)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Identity provider or directory API failures
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// At least one item of an approval batch failed
    #[error("Approval failed for {} of {} accounts", failed_count(.0), .0.len())]
    ApprovalFailed(Vec<ApprovalOutcome>),
}

fn failed_count(outcomes: &[ApprovalOutcome]) -> usize {
    outcomes.iter().filter(|o| !o.succeeded()).count()
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ApprovalOutcome>>,
}

impl IntoResponse for IamError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            IamError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
            ),
            IamError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            IamError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            IamError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            IamError::ApprovalFailed(_) => (
                StatusCode::BAD_REQUEST,
                "ApprovalFailed",
                self.to_string(),
            ),
            IamError::Upstream(_) => (
                StatusCode::BAD_GATEWAY,
                "UpstreamError",
                self.to_string(),
            ),
            IamError::Database(_) | IamError::Internal(_) | IamError::Io(_) | IamError::Jwt(_) => {
                tracing::error!("Request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "Internal server error".to_string(), // Don't leak details
                )
            }
        };

        let results = match self {
            IamError::ApprovalFailed(outcomes) => Some(outcomes),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            results,
        });

        (status, body).into_response()
    }
}

/// Result type alias for IAM operations
pub type IamResult<T> = Result<T, IamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (IamError::Authentication("x".into()), StatusCode::UNAUTHORIZED),
            (IamError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (IamError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (IamError::Conflict("x".into()), StatusCode::CONFLICT),
            (IamError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
            (IamError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let response = IamError::Internal("secret table name".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body.error, "InternalServerError");
        assert!(!body.message.contains("secret"));
    }

    #[tokio::test]
    async fn test_approval_failure_carries_results() {
        let outcomes = vec![
            ApprovalOutcome::success("a@example.com", "jackw"),
            ApprovalOutcome::failure("b@example.com", "account not found in database"),
        ];
        let response = IamError::ApprovalFailed(outcomes).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        let results = body.results.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(body.message, "Approval failed for 1 of 2 accounts");
    }
}
