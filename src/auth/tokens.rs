/// Signed, time-boxed tokens
///
/// Every token is an HS256 JWT over the configured secret. Sessions carry the
/// role they were issued for; confirmation and reset tokens are also stored
/// on the account together with their own expiration, which callers check
/// on every use in addition to the signature.
use crate::error::{AppError, AppResult};
use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub const USER_SESSION_TTL_SECS: i64 = 60 * 60;
pub const ADMIN_SESSION_TTL_SECS: i64 = 8 * 60 * 60;
pub const CONFIRMATION_TTL_MS: i64 = 2 * 60 * 60 * 1000;
pub const RESET_TTL_MS: i64 = 60 * 60 * 1000;
pub const CSRF_TTL_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Login session claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Claims for email confirmation and password reset links
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionClaims {
    pub email: String,
    pub role: Role,
    /// Random nonce so two links issued in the same second differ
    pub jti: String,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CsrfClaims {
    token: String,
    /// Epoch milliseconds
    expires: i64,
    exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobClaims {
    bucket: String,
    key: String,
    exp: i64,
}

/// Issued CSRF pair: the raw token for the client, the signed cookie value
#[derive(Debug, Clone)]
pub struct CsrfToken {
    pub token: String,
    pub cookie_value: String,
}

/// Token issuing and verification over one secret
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    fn sign<T: Serialize>(&self, claims: &T) -> AppResult<String> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> AppResult<T> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("Token verification failed: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        AppError::InvalidToken("Token has expired".to_string())
                    }
                    _ => AppError::InvalidToken("Invalid token".to_string()),
                }
            })
    }

    /// One-hour session for a user account
    pub fn issue_user_session(&self, id: &str, email: &str) -> AppResult<String> {
        let now = Utc::now().timestamp();
        self.sign(&SessionClaims {
            email: email.to_string(),
            id: Some(id.to_string()),
            role: Role::User,
            iat: now,
            exp: now + USER_SESSION_TTL_SECS,
        })
    }

    /// Eight-hour session for an admin
    pub fn issue_admin_session(&self, email: &str) -> AppResult<String> {
        let now = Utc::now().timestamp();
        self.sign(&SessionClaims {
            email: email.to_string(),
            id: None,
            role: Role::Admin,
            iat: now,
            exp: now + ADMIN_SESSION_TTL_SECS,
        })
    }

    pub fn verify_session(&self, token: &str) -> AppResult<SessionClaims> {
        self.verify(token)
    }

    /// Link token for confirmation or password reset, valid until `expires_at_ms`
    pub fn issue_action_token(&self, email: &str, role: Role, expires_at_ms: i64) -> AppResult<String> {
        self.sign(&ActionClaims {
            email: email.to_string(),
            role,
            jti: random_hex(16),
            exp: expires_at_ms / 1000,
        })
    }

    pub fn verify_action_token(&self, token: &str) -> AppResult<ActionClaims> {
        self.verify(token)
    }

    /// Fresh CSRF token, valid for ten minutes
    pub fn issue_csrf(&self) -> AppResult<CsrfToken> {
        let token = random_hex(32);
        let expires = Utc::now().timestamp_millis() + CSRF_TTL_MS;
        let cookie_value = self.sign(&CsrfClaims {
            token: token.clone(),
            expires,
            exp: expires / 1000,
        })?;

        Ok(CsrfToken {
            token,
            cookie_value,
        })
    }

    /// Header token must match the one inside a valid, unexpired cookie
    pub fn verify_csrf(&self, cookie_value: &str, header_token: &str) -> bool {
        let Ok(claims) = self.verify::<CsrfClaims>(cookie_value) else {
            return false;
        };

        if claims.expires <= Utc::now().timestamp_millis() {
            return false;
        }

        constant_time_eq(claims.token.as_bytes(), header_token.as_bytes())
    }

    /// Token granting read access to one stored blob until `expires_at` (epoch seconds)
    pub fn issue_blob_token(&self, bucket: &str, key: &str, expires_at: i64) -> AppResult<String> {
        self.sign(&BlobClaims {
            bucket: bucket.to_string(),
            key: key.to_string(),
            exp: expires_at,
        })
    }

    /// True when the token was issued for exactly this bucket and key
    pub fn verify_blob_token(&self, token: &str, bucket: &str, key: &str) -> bool {
        match self.verify::<BlobClaims>(token) {
            Ok(claims) => claims.bucket == bucket && claims.key == key,
            Err(_) => false,
        }
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret-key-for-testing-only-0123456789")
    }

    #[test]
    fn test_user_session_roundtrip() {
        let tokens = service();
        let token = tokens.issue_user_session("7", "ana@example.com").unwrap();
        let claims = tokens.verify_session(&token).unwrap();

        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.id.as_deref(), Some("7"));
        assert_eq!(claims.email, "ana@example.com");
        assert_eq!(claims.exp - claims.iat, USER_SESSION_TTL_SECS);
    }

    #[test]
    fn test_admin_session_has_admin_role() {
        let tokens = service();
        let token = tokens.issue_admin_session("admin@example.com").unwrap();
        let claims = tokens.verify_session(&token).unwrap();

        assert_eq!(claims.role, Role::Admin);
        assert!(claims.id.is_none());
        assert_eq!(claims.exp - claims.iat, ADMIN_SESSION_TTL_SECS);
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let other = TokenService::new("another-secret-key-that-is-long-enough!!");
        let token = other.issue_user_session("1", "a@b.co").unwrap();
        assert!(matches!(
            service().verify_session(&token),
            Err(AppError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_action_token_rejected() {
        let tokens = service();
        let past = Utc::now().timestamp_millis() - 60_000;
        let token = tokens
            .issue_action_token("ana@example.com", Role::User, past)
            .unwrap();

        assert!(matches!(
            tokens.verify_action_token(&token),
            Err(AppError::InvalidToken(m)) if m == "Token has expired"
        ));
    }

    #[test]
    fn test_action_tokens_are_unique() {
        let tokens = service();
        let expires = Utc::now().timestamp_millis() + RESET_TTL_MS;
        let a = tokens.issue_action_token("a@b.co", Role::User, expires).unwrap();
        let b = tokens.issue_action_token("a@b.co", Role::User, expires).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_csrf_check() {
        let tokens = service();
        let csrf = tokens.issue_csrf().unwrap();

        assert_eq!(csrf.token.len(), 64);
        assert!(tokens.verify_csrf(&csrf.cookie_value, &csrf.token));
        assert!(!tokens.verify_csrf(&csrf.cookie_value, "forged"));
        assert!(!tokens.verify_csrf("garbage", &csrf.token));
    }

    #[test]
    fn test_blob_token_is_bound_to_key() {
        let tokens = service();
        let exp = Utc::now().timestamp() + 60;
        let token = tokens.issue_blob_token("permanent", "Ana Smith_Bob Lee.jpg", exp).unwrap();

        assert!(tokens.verify_blob_token(&token, "permanent", "Ana Smith_Bob Lee.jpg"));
        assert!(!tokens.verify_blob_token(&token, "temporary", "Ana Smith_Bob Lee.jpg"));
        assert!(!tokens.verify_blob_token(&token, "permanent", "other.jpg"));
    }
}
