/// Account management
///
/// User registration, login with ban tracking, email confirmation, password
/// reset and change, upload quotas, and admin sign-in.

pub mod quota;
pub mod repository;

mod manager;

pub use manager::AccountManager;

use crate::db::account::UserRecord;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(rename = "Name", default)]
    #[validate(length(min = 1, message = "Name is required."))]
    pub name: String,

    #[serde(rename = "FamilyName", default)]
    #[validate(length(min = 1, message = "Family name is required."))]
    pub family_name: String,

    #[serde(rename = "Email", default)]
    #[validate(custom(function = "crate::validation::validate_email_format"))]
    pub email: String,

    #[serde(rename = "Password", default)]
    #[validate(custom(function = "crate::validation::validate_password_strength"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub token: String,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "Email", default)]
    pub email: String,
    #[serde(rename = "Password", default)]
    pub password: String,
}

/// Body carrying a confirmation or reset token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(rename = "Email", default)]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,

    #[serde(rename = "newPassword", default)]
    #[validate(custom(function = "crate::validation::validate_password_strength"))]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(rename = "currentPassword", default)]
    pub current_password: String,
    #[serde(rename = "newPassword", default)]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub enabled: bool,
}

/// Plain `{ "message": ... }` reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What a signed-in user may see about their own account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPublicInfo {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "FamilyName")]
    pub family_name: String,
    #[serde(rename = "Email")]
    pub email: String,
    #[serde(rename = "isConfirmed")]
    pub is_confirmed: bool,
    #[serde(rename = "uploadCount")]
    pub upload_count: i64,
    #[serde(rename = "lastUploadDate")]
    pub last_upload_date: String,
    pub notification_enabled: i64,
}

impl From<UserRecord> for UserPublicInfo {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            name: user.name,
            family_name: user.family_name,
            email: user.email,
            is_confirmed: user.is_confirmed,
            upload_count: user.upload_count,
            last_upload_date: user.last_upload_date,
            notification_enabled: user.notification_enabled,
        }
    }
}
