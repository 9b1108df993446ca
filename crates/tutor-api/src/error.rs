use std::fmt::Display;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use tutor_types::api::ErrorBody;
use tutor_types::models::RateLimitStatus;

pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const NOT_FOUND: &str = "NOT_FOUND";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Rejected before any persistence or quota read.
    #[error("{0}")]
    Validation(String),

    #[error("Daily message limit reached. Please try again tomorrow.")]
    RateLimited(RateLimitStatus),

    #[error("Conversation not found")]
    ConversationNotFound,

    /// Message is safe to show to the client; the cause is logged where it happens.
    #[error("{0}")]
    Internal(String),

    #[error("Request was cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn missing_fields() -> Self {
        ApiError::Validation("userId and content are required".into())
    }

    pub fn missing_user_id() -> Self {
        ApiError::Validation("userId is required".into())
    }

    pub fn internal(context: &str, cause: impl Display) -> Self {
        error!("{}: {}", context, cause);
        ApiError::Internal(context.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ConversationNotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) | ApiError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Validation(_) => ErrorBody {
                error: self.to_string(),
                code: None,
                rate_limit: None,
            },
            ApiError::RateLimited(rate_limit) => ErrorBody {
                error: self.to_string(),
                code: Some(RATE_LIMIT_EXCEEDED.into()),
                rate_limit: Some(*rate_limit),
            },
            ApiError::ConversationNotFound => ErrorBody {
                error: self.to_string(),
                code: Some(NOT_FOUND.into()),
                rate_limit: None,
            },
            ApiError::Internal(_) | ApiError::Cancelled => ErrorBody {
                error: self.to_string(),
                code: Some(INTERNAL_ERROR.into()),
                rate_limit: None,
            },
        };

        (status, Json(body)).into_response()
    }
}
