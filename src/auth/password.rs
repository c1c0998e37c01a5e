/// Password hashing and strength rules
use crate::error::{AppError, AppResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

pub const WEAK_PASSWORD_MESSAGE: &str = "Password is too weak.";

/// Hash a password with Argon2id and a fresh random salt
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Check a password against a stored PHC hash string
///
/// A stored hash that cannot be parsed is an internal error, not a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// At least 8 characters with a lowercase letter, an uppercase letter and a digit
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

/// `Validation` error unless the password is strong
pub fn ensure_strong_password(password: &str) -> AppResult<()> {
    if is_strong_password(password) {
        Ok(())
    } else {
        Err(AppError::Validation(WEAK_PASSWORD_MESSAGE.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Secret123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("Secret123", &hash).unwrap());
        assert!(!verify_password("Secret124", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("Secret123").unwrap();
        let b = hash_password("Secret123").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_garbage_hash_is_internal_error() {
        assert!(matches!(
            verify_password("x", "not-a-hash"),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn test_password_strength() {
        assert!(is_strong_password("Abcdefg1"));
        assert!(!is_strong_password("Abcdef1"));
        assert!(!is_strong_password("abcdefg1"));
        assert!(!is_strong_password("ABCDEFG1"));
        assert!(!is_strong_password("Abcdefgh"));
        assert!(matches!(
            ensure_strong_password("weak"),
            Err(AppError::Validation(m)) if m == WEAK_PASSWORD_MESSAGE
        ));
    }
}
