/// SQLite repositories for user and admin accounts
use crate::{
    db::account::{AdminRecord, UserRecord},
    error::{AppError, AppResult},
};
use chrono::Utc;
use sqlx::SqlitePool;

/// Fields of a freshly registered user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub family_name: String,
    pub email: String,
    pub password_hash: String,
    pub confirmation_token: Option<String>,
    pub token_expiration: Option<i64>,
}

/// Quota counter after a successful conditional decrement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCountUpdate {
    pub upload_count: i64,
    pub last_upload_date: String,
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// User account storage
#[derive(Clone)]
pub struct UserRepository {
    db: SqlitePool,
}

impl UserRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<UserRecord>> {
        tracing::debug!(email, "Looking up user by email");
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_confirmation_token(&self, token: &str) -> AppResult<Option<UserRecord>> {
        let user =
            sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE confirmation_token = ?1")
                .bind(token)
                .fetch_optional(&self.db)
                .await?;
        Ok(user)
    }

    pub async fn find_by_reset_token(&self, token: &str) -> AppResult<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE reset_token = ?1")
            .bind(token)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn email_exists(&self, email: &str) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?1")
            .bind(email)
            .fetch_one(&self.db)
            .await?;
        Ok(count > 0)
    }

    /// Insert a user with the next numeric id (highest existing id + 1)
    ///
    /// Id allocation and insert run as one statement. A taken email maps to
    /// `AlreadyExists`.
    pub async fn create(&self, user: NewUser) -> AppResult<UserRecord> {
        let created = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (
                id, name, family_name, email, password_hash,
                confirmation_token, token_expiration,
                is_confirmed, upload_count, last_upload_date, notification_enabled, created_at
            )
            SELECT CAST(COALESCE(MAX(CAST(id AS INTEGER)), 0) + 1 AS TEXT),
                   ?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ' ', 0, ?7
            FROM users
            RETURNING *
            "#,
        )
        .bind(&user.name)
        .bind(&user.family_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.confirmation_token)
        .bind(user.token_expiration)
        .bind(Utc::now().to_rfc3339())
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::AlreadyExists("Email".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

        tracing::info!(id = %created.id, "User account created");
        Ok(created)
    }

    pub async fn update_password(&self, id: &str, password_hash: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET password_hash = ?1 WHERE id = ?2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Mark confirmed and drop the confirmation token
    pub async fn confirm_email(&self, id: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET is_confirmed = 1, confirmation_token = NULL, token_expiration = NULL WHERE id = ?1",
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn store_confirmation_token(&self, id: &str, token: &str, expires_at: i64) -> AppResult<()> {
        sqlx::query("UPDATE users SET confirmation_token = ?1, token_expiration = ?2 WHERE id = ?3")
            .bind(token)
            .bind(expires_at)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn store_reset_token(&self, id: &str, token: &str, expires_at: i64) -> AppResult<()> {
        sqlx::query("UPDATE users SET reset_token = ?1, reset_token_expiration = ?2 WHERE id = ?3")
            .bind(token)
            .bind(expires_at)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn clear_reset_token(&self, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET reset_token = NULL, reset_token_expiration = NULL WHERE id = ?1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    pub async fn update_notification_preference(&self, id: &str, enabled: bool) -> AppResult<()> {
        sqlx::query("UPDATE users SET notification_enabled = ?1 WHERE id = ?2")
            .bind(i64::from(enabled))
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Conditionally spend one upload from the daily quota
    ///
    /// The new value is computed by the database inside the guarded UPDATE:
    /// a new day restarts from `daily_max`, otherwise the stored count drops
    /// by one. The row is only touched while the stored count is positive or
    /// the stored date is stale, so concurrent callers can never spend more
    /// than `daily_max` uploads on one day. Returns `None` when the guard
    /// rejected the write.
    pub async fn update_upload_count(
        &self,
        id: &str,
        today: &str,
        daily_max: i64,
    ) -> AppResult<Option<UploadCountUpdate>> {
        let row: Option<(i64, String)> = sqlx::query_as(
            r#"
            UPDATE users
            SET upload_count = CASE
                    WHEN last_upload_date = ?1 THEN upload_count - 1
                    ELSE ?2 - 1
                END,
                last_upload_date = ?1
            WHERE id = ?3 AND (upload_count > 0 OR last_upload_date <> ?1)
            RETURNING upload_count, last_upload_date
            "#,
        )
        .bind(today)
        .bind(daily_max)
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(upload_count, last_upload_date)| UploadCountUpdate {
            upload_count,
            last_upload_date,
        }))
    }
}

/// Admin account storage
#[derive(Clone)]
pub struct AdminRepository {
    db: SqlitePool,
}

impl AdminRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn find_admin_by_email(&self, email: &str) -> AppResult<Option<AdminRecord>> {
        let admin = sqlx::query_as::<_, AdminRecord>("SELECT * FROM admins WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(admin)
    }

    /// Create the admin, or replace the password of an existing one
    pub async fn upsert_admin(&self, email: &str, password_hash: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admins (id, email, password_hash)
            SELECT CAST(COALESCE(MAX(CAST(id AS INTEGER)), 0) + 1 AS TEXT), ?1, ?2 FROM admins WHERE true
            ON CONFLICT(email) DO UPDATE SET password_hash = excluded.password_hash
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .execute(&self.db)
        .await?;

        tracing::info!(email, "Admin account provisioned");
        Ok(())
    }
}
