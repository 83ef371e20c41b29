use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Recommendation has no supporting connections")]
    NoJustification,

    #[error("Cannot recommend a user to themselves")]
    SelfRecommendation,

    #[error("User is already recommended in this collection")]
    DuplicateRecommendation,

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("Deadline exceeded while generating recommendations")]
    DeadlineExceeded,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::UpstreamFetch(_)
                | AppError::DeadlineExceeded
                | AppError::Database(_)
                | AppError::Cache(_)
                | AppError::HttpClient(_)
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::InvalidIdentifier(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ if self.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_and_deadline_are_retryable() {
        assert!(AppError::UpstreamFetch("graph down".to_string()).is_retryable());
        assert!(AppError::DeadlineExceeded.is_retryable());
        assert!(!AppError::NoJustification.is_retryable());
        assert!(!AppError::InvalidIdentifier("0".to_string()).is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        let response = AppError::InvalidIdentifier("-1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AppError::DeadlineExceeded.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = AppError::SelfRecommendation.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
