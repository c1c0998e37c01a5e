/// Account manager: the user and admin account flows
///
/// Route handlers stay thin; every rule about registration, sign-in, tokens
/// and passwords lives here.
use super::{
    repository::{AdminRepository, NewUser, UserRepository},
    ChangePasswordRequest, LoginRequest, RegisterRequest, RegisterResponse, ResetPasswordRequest,
    UserPublicInfo,
};
use crate::{
    auth::{
        password::{ensure_strong_password, hash_password, verify_password},
        tokens::{Role, TokenService, CONFIRMATION_TTL_MS, RESET_TTL_MS},
    },
    ban::BanTracker,
    db::account::UserRecord,
    error::{AppError, AppResult},
    mailer::Mailer,
    metrics,
    validation::{is_valid_email, INVALID_EMAIL_MESSAGE},
};
use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

pub const REGISTERED_MESSAGE: &str =
    "Registration successful. Please check your email for confirmation.";
const UNKNOWN_ACCOUNT_MESSAGE: &str =
    "Invalid email or password. Please register if you do not have an account.";
const WRONG_PASSWORD_MESSAGE: &str = "The password you entered is not correct.";
const INVALID_LINK_MESSAGE: &str = "Invalid or expired token.";

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Stored token expirations are checked apart from the JWT's own `exp`
fn stored_token_live(expires_at: Option<i64>) -> bool {
    matches!(expires_at, Some(exp) if exp >= now_ms())
}

/// Account manager service
pub struct AccountManager {
    users: UserRepository,
    admins: AdminRepository,
    bans: BanTracker,
    tokens: Arc<TokenService>,
    mailer: Arc<Mailer>,
}

impl AccountManager {
    pub fn new(
        users: UserRepository,
        admins: AdminRepository,
        bans: BanTracker,
        tokens: Arc<TokenService>,
        mailer: Arc<Mailer>,
    ) -> Self {
        Self {
            users,
            admins,
            bans,
            tokens,
            mailer,
        }
    }

    /// Create an unconfirmed account and mail its confirmation link
    pub async fn register(&self, request: RegisterRequest) -> AppResult<RegisterResponse> {
        request.validate()?;

        if self.users.email_exists(&request.email).await? {
            metrics::record_registration("duplicate");
            return Err(AppError::AlreadyExists("Email".to_string()));
        }

        let expires_at = now_ms() + CONFIRMATION_TTL_MS;
        let token = self
            .tokens
            .issue_action_token(&request.email, Role::User, expires_at)?;

        let user = self
            .users
            .create(NewUser {
                name: request.name,
                family_name: request.family_name,
                email: request.email,
                password_hash: hash_password(&request.password)?,
                confirmation_token: Some(token.clone()),
                token_expiration: Some(expires_at),
            })
            .await?;

        // The account exists either way; the link can be re-sent later
        if let Err(e) = self.mailer.send_confirmation_email(&user.email, &token).await {
            tracing::warn!(id = %user.id, "Confirmation email not sent: {}", e);
        }

        metrics::record_registration("success");
        Ok(RegisterResponse {
            message: REGISTERED_MESSAGE.to_string(),
            token,
        })
    }

    /// Check credentials from `ip`, returning a fresh user session token
    ///
    /// A banned address is refused before the password is looked at.
    pub async fn login(&self, request: &LoginRequest, ip: &str) -> AppResult<String> {
        if let Err(e) = self.bans.check(ip).await {
            metrics::record_login("user", "banned");
            return Err(e);
        }

        let Some(user) = self.users.find_by_email(&request.email).await? else {
            metrics::record_login("user", "unknown");
            return Err(AppError::Unauthenticated(UNKNOWN_ACCOUNT_MESSAGE.to_string()));
        };

        if !verify_password(&request.password, &user.password_hash)? {
            tracing::warn!(ip, "Failed login attempt");
            if let Err(e) = self.bans.record_failure(ip, &user.email).await {
                metrics::record_login("user", "banned");
                return Err(e);
            }
            metrics::record_login("user", "failure");
            return Err(AppError::Unauthenticated(WRONG_PASSWORD_MESSAGE.to_string()));
        }

        self.bans.reset(ip).await?;
        let session = self.tokens.issue_user_session(&user.id, &user.email)?;

        metrics::record_login("user", "success");
        tracing::info!(id = %user.id, "User logged in");
        Ok(session)
    }

    /// Confirm the account holding `token`, if the stored link is still live
    pub async fn confirm_by_token(&self, token: &str) -> AppResult<()> {
        if token.is_empty() {
            return Err(AppError::Validation(INVALID_LINK_MESSAGE.to_string()));
        }

        let user = self
            .users
            .find_by_confirmation_token(token)
            .await?
            .filter(|user| stored_token_live(user.token_expiration))
            .ok_or_else(|| AppError::Validation(INVALID_LINK_MESSAGE.to_string()))?;

        self.users.confirm_email(&user.id).await?;
        tracing::info!(id = %user.id, "Email confirmed");
        Ok(())
    }

    /// Issue and mail a new confirmation link for the account named in `token`
    pub async fn send_confirmation(&self, token: &str) -> AppResult<()> {
        let claims = self.tokens.verify_action_token(token)?;
        if claims.role != Role::User {
            return Err(AppError::forbidden());
        }

        let user = self
            .users
            .find_by_email(&claims.email)
            .await?
            .ok_or_else(|| AppError::NotFound("Email".to_string()))?;

        let expires_at = now_ms() + CONFIRMATION_TTL_MS;
        let new_token = self
            .tokens
            .issue_action_token(&user.email, Role::User, expires_at)?;
        self.users
            .store_confirmation_token(&user.id, &new_token, expires_at)
            .await?;

        self.mailer
            .send_confirmation_email(&user.email, &new_token)
            .await
    }

    /// Store a one-hour reset token and mail the reset link
    pub async fn forgot_password(&self, email: &str) -> AppResult<()> {
        if !is_valid_email(email) {
            return Err(AppError::Validation(INVALID_EMAIL_MESSAGE.to_string()));
        }

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("Email".to_string()))?;

        let expires_at = now_ms() + RESET_TTL_MS;
        let token = self
            .tokens
            .issue_action_token(&user.email, Role::User, expires_at)?;
        self.users
            .store_reset_token(&user.id, &token, expires_at)
            .await?;

        tracing::info!(id = %user.id, "Password reset requested");
        self.mailer
            .send_password_reset_email(&user.email, &token)
            .await
    }

    /// Set a new password from a reset link and lift bans against the account
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> AppResult<()> {
        let claims = self.tokens.verify_action_token(&request.token)?;
        if claims.role != Role::User {
            return Err(AppError::forbidden());
        }
        if !is_valid_email(&claims.email) {
            return Err(AppError::Validation(INVALID_EMAIL_MESSAGE.to_string()));
        }
        request.validate()?;

        let user = self
            .users
            .find_by_email(&claims.email)
            .await?
            .filter(|user| {
                user.reset_token.as_deref() == Some(request.token.as_str())
                    && stored_token_live(user.reset_token_expiration)
            })
            .ok_or_else(|| AppError::InvalidToken("Invalid or expired token".to_string()))?;

        self.users
            .update_password(&user.id, &hash_password(&request.new_password)?)
            .await?;
        self.users.clear_reset_token(&user.id).await?;

        let lifted = self.bans.remove_bans_for_email(&user.email).await?;
        tracing::info!(id = %user.id, bans_lifted = lifted, "Password reset");
        Ok(())
    }

    pub async fn change_password(&self, user_id: &str, request: &ChangePasswordRequest) -> AppResult<()> {
        let user = self.require_user(user_id).await?;

        if !verify_password(&request.current_password, &user.password_hash)? {
            return Err(AppError::Unauthenticated(
                "Current password is incorrect".to_string(),
            ));
        }
        ensure_strong_password(&request.new_password)?;

        self.users
            .update_password(&user.id, &hash_password(&request.new_password)?)
            .await?;
        tracing::info!(id = %user.id, "Password changed");
        Ok(())
    }

    pub async fn set_notification(&self, user_id: &str, enabled: bool) -> AppResult<()> {
        self.users
            .update_notification_preference(user_id, enabled)
            .await
    }

    pub async fn user_info(&self, user_id: &str) -> AppResult<UserPublicInfo> {
        Ok(self.require_user(user_id).await?.into())
    }

    /// Check admin credentials, returning a fresh admin session token
    pub async fn admin_login(&self, email: &str, password: &str) -> AppResult<String> {
        if email.is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let admin = self.admins.find_admin_by_email(email).await?;
        let valid = match &admin {
            Some(admin) => verify_password(password, &admin.password_hash)?,
            None => false,
        };

        if !valid {
            tracing::warn!(email, "Failed admin login");
            metrics::record_login("admin", "failure");
            return Err(AppError::Unauthenticated("Invalid credentials".to_string()));
        }

        metrics::record_login("admin", "success");
        tracing::info!(email, "Admin logged in");
        self.tokens.issue_admin_session(email)
    }

    /// Provision the configured admin account at startup
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> AppResult<()> {
        self.admins
            .upsert_admin(email, &hash_password(password)?)
            .await
    }

    async fn require_user(&self, user_id: &str) -> AppResult<UserRecord> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))
    }
}
