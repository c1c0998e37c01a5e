/// Account database models
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub family_name: String,
    pub email: String,
    pub password_hash: String,
    pub confirmation_token: Option<String>,
    /// Epoch milliseconds
    pub token_expiration: Option<i64>,
    pub reset_token: Option<String>,
    /// Epoch milliseconds
    pub reset_token_expiration: Option<i64>,
    pub is_confirmed: bool,
    pub upload_count: i64,
    /// `YYYY-MM-DD`, or a single space before the first upload
    pub last_upload_date: String,
    pub notification_enabled: i64,
    pub created_at: String,
}

/// Admin record in the database
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AdminRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
}

/// Failed-login state for one source address
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BanRecord {
    pub ip: String,
    pub attempts: i64,
    /// Epoch milliseconds
    pub last_attempt: i64,
    /// Epoch milliseconds
    pub banned_until: Option<i64>,
    pub banned_email: Option<String>,
}
