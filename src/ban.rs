/// Failed-login tracking and temporary bans per source address
use crate::{
    db::account::BanRecord,
    error::{AppError, AppResult},
};
use chrono::Utc;
use sqlx::SqlitePool;

pub const MAX_ATTEMPTS: i64 = 5;
/// Milliseconds
pub const ATTEMPT_WINDOW: i64 = 60 * 1000;
/// Milliseconds
pub const BAN_DURATION: i64 = 60 * 60 * 1000;

pub const BANNED_MESSAGE: &str =
    "You are banned for an hour due to multiple incorrect login attempts.";

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Ban tracker over the `banned_ips` table
#[derive(Clone)]
pub struct BanTracker {
    db: SqlitePool,
}

impl BanTracker {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn status(&self, ip: &str) -> AppResult<Option<BanRecord>> {
        let record = sqlx::query_as::<_, BanRecord>("SELECT * FROM banned_ips WHERE ip = ?1")
            .bind(ip)
            .fetch_optional(&self.db)
            .await?;
        Ok(record)
    }

    /// Fail with `Banned` while `ip` is serving a ban
    pub async fn check(&self, ip: &str) -> AppResult<()> {
        self.check_at(ip, now_ms()).await
    }

    pub async fn check_at(&self, ip: &str, now: i64) -> AppResult<()> {
        let Some(record) = self.status(ip).await? else {
            return Ok(());
        };

        match record.banned_until {
            Some(until) if until > now => {
                tracing::warn!(ip, "Login attempt from banned address");
                Err(AppError::Banned(BANNED_MESSAGE.to_string()))
            }
            Some(_) => {
                // Served its time: start over with a clean slate
                self.reset_at(ip, now).await
            }
            None => Ok(()),
        }
    }

    /// Count a failed login; the attempt that reaches the limit starts a ban
    ///
    /// Returns the attempt count inside the current window, or `Banned`.
    pub async fn record_failure(&self, ip: &str, email: &str) -> AppResult<i64> {
        self.record_failure_at(ip, email, now_ms()).await
    }

    pub async fn record_failure_at(&self, ip: &str, email: &str, now: i64) -> AppResult<i64> {
        let attempts: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO banned_ips (ip, attempts, last_attempt)
            VALUES (?1, 1, ?2)
            ON CONFLICT(ip) DO UPDATE SET
                attempts = CASE
                    WHEN ?2 - banned_ips.last_attempt > ?3 THEN 1
                    ELSE banned_ips.attempts + 1
                END,
                last_attempt = ?2
            RETURNING attempts
            "#,
        )
        .bind(ip)
        .bind(now)
        .bind(ATTEMPT_WINDOW)
        .fetch_one(&self.db)
        .await?;

        if attempts >= MAX_ATTEMPTS {
            sqlx::query("UPDATE banned_ips SET banned_until = ?1, banned_email = ?2 WHERE ip = ?3")
                .bind(now + BAN_DURATION)
                .bind(email)
                .bind(ip)
                .execute(&self.db)
                .await?;

            tracing::warn!(ip, attempts, "Address banned after repeated login failures");
            return Err(AppError::Banned(BANNED_MESSAGE.to_string()));
        }

        Ok(attempts)
    }

    /// Clear attempts and any ban, after a successful login
    pub async fn reset(&self, ip: &str) -> AppResult<()> {
        self.reset_at(ip, now_ms()).await
    }

    async fn reset_at(&self, ip: &str, now: i64) -> AppResult<()> {
        sqlx::query(
            "UPDATE banned_ips SET attempts = 0, last_attempt = ?1, banned_until = NULL, banned_email = NULL WHERE ip = ?2",
        )
        .bind(now)
        .bind(ip)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    /// Lift every ban recorded against `email`, on any address
    pub async fn remove_bans_for_email(&self, email: &str) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE banned_ips SET attempts = 0, banned_until = NULL, banned_email = NULL WHERE banned_email = ?1",
        )
        .bind(email)
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            tracing::info!(email, lifted = result.rows_affected(), "Bans lifted after password reset");
        }
        Ok(result.rows_affected())
    }
}
