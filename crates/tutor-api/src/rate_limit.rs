//! Daily AI message quota.
//!
//! The counter lives in `daily_usage`, keyed by (user, calendar date). A user
//! with no row for today has used nothing, so rollover needs no reset job.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};

use tutor_db::Database;
use tutor_types::api::RateLimitResponse;
use tutor_types::models::RateLimitStatus;

use crate::error::ApiError;
use crate::{AppState, run_db};

pub const DEFAULT_DAILY_LIMIT: u32 = 50;

/// Calendar key for the usage counter.
pub fn usage_date(now: DateTime<Utc>) -> String {
    now.date_naive().format("%Y-%m-%d").to_string()
}

pub fn today() -> String {
    usage_date(Utc::now())
}

#[derive(Clone)]
pub struct RateLimiter {
    db: Arc<Database>,
    limit: u32,
}

impl RateLimiter {
    pub fn new(db: Arc<Database>, limit: u32) -> Self {
        Self { db, limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Pure read of today's quota for `user_id`.
    pub async fn status(&self, user_id: &str) -> Result<RateLimitStatus, ApiError> {
        if user_id.trim().is_empty() {
            return Err(ApiError::missing_user_id());
        }

        let uid = user_id.to_string();
        let date = today();
        let usage = run_db(&self.db, move |db| db.get_usage(&uid, &date))
            .await
            .map_err(|e| ApiError::internal("Failed to check rate limit", e))?;

        let current = usage
            .map(|u| u32::try_from(u.message_count).unwrap_or(u32::MAX))
            .unwrap_or(0);

        Ok(RateLimitStatus::new(self.limit, current))
    }
}

/// GET /rate-limit/{user_id}
pub async fn get_rate_limit(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<RateLimitResponse>, ApiError> {
    let rate_limit = state.limiter.status(&user_id).await?;
    Ok(Json(RateLimitResponse { rate_limit }))
}

/// GET /rate-limit without a user id.
pub async fn missing_user_id() -> ApiError {
    ApiError::missing_user_id()
}
