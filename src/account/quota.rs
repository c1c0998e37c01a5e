/// Daily upload quotas
///
/// Signed-in users spend from a per-account counter that restarts at
/// `DAILY_UPLOAD_LIMIT` every UTC day. Anonymous uploads are counted per
/// source address and day in `upload_counts`.
use super::repository::{UploadCountUpdate, UserRepository};
use crate::error::{AppError, AppResult};
use chrono::Utc;
use sqlx::SqlitePool;

pub const DAILY_UPLOAD_LIMIT: i64 = 10;

pub const USER_QUOTA_EXHAUSTED: &str =
    "You have reached your maximum uploads for today. Please try again tomorrow.";
pub const USER_QUOTA_CHANGED: &str = "Upload quota has changed. Please refresh and try again.";
pub const IP_QUOTA_EXHAUSTED: &str =
    "Daily upload limit exceeded. You can upload up to 10 images per day. Please try again tomorrow.";

/// Today's UTC date as `YYYY-MM-DD`
pub fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Per-account daily quota
#[derive(Clone)]
pub struct UploadQuota {
    users: UserRepository,
}

impl UploadQuota {
    pub fn new(users: UserRepository) -> Self {
        Self { users }
    }

    /// Spend one upload for `user_id` today
    pub async fn consume(&self, user_id: &str) -> AppResult<UploadCountUpdate> {
        self.consume_on(user_id, &today_utc()).await
    }

    /// Spend one upload against the quota of `today`
    ///
    /// A lost race with another upload surfaces as `Conflict`; there is no
    /// automatic retry.
    pub async fn consume_on(&self, user_id: &str, today: &str) -> AppResult<UploadCountUpdate> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        let effective = if user.last_upload_date == today {
            user.upload_count
        } else {
            DAILY_UPLOAD_LIMIT
        };

        if effective <= 0 {
            return Err(AppError::RateLimited(USER_QUOTA_EXHAUSTED.to_string()));
        }

        match self
            .users
            .update_upload_count(user_id, today, DAILY_UPLOAD_LIMIT)
            .await?
        {
            Some(update) => {
                tracing::debug!(user_id, remaining = update.upload_count, "Upload quota spent");
                Ok(update)
            }
            None => {
                tracing::warn!(user_id, "Upload quota changed concurrently");
                Err(AppError::Conflict(USER_QUOTA_CHANGED.to_string()))
            }
        }
    }
}

/// Anonymous uploads per source address per day
#[derive(Clone)]
pub struct IpUploadCounter {
    db: SqlitePool,
}

impl IpUploadCounter {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Count one upload from `ip` today, returning the count so far
    pub async fn record_upload(&self, ip: &str) -> AppResult<i64> {
        self.record_upload_on(ip, &today_utc()).await
    }

    /// Increment `{ip}#{date}` while it is below the daily limit
    ///
    /// The check and the increment are a single upsert; storage failures
    /// propagate so that uploads are refused when counting is impossible.
    pub async fn record_upload_on(&self, ip: &str, date: &str) -> AppResult<i64> {
        let key = format!("{}#{}", ip, date);

        let count: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO upload_counts (ip_date, count, last_updated, date)
            VALUES (?1, 1, ?2, ?3)
            ON CONFLICT(ip_date) DO UPDATE
                SET count = upload_counts.count + 1, last_updated = excluded.last_updated
                WHERE upload_counts.count < ?4
            RETURNING count
            "#,
        )
        .bind(&key)
        .bind(Utc::now().to_rfc3339())
        .bind(date)
        .bind(DAILY_UPLOAD_LIMIT)
        .fetch_optional(&self.db)
        .await?;

        count.ok_or_else(|| {
            tracing::warn!(ip, "Anonymous upload limit reached");
            AppError::RateLimited(IP_QUOTA_EXHAUSTED.to_string())
        })
    }
}
