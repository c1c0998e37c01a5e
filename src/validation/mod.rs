/// Input validation
///
/// Person names, emails and passwords, plus the upload pipeline in
/// `upload` and malware scanning in `antivirus`.
pub mod antivirus;
pub mod upload;

use crate::auth::password::{is_strong_password, WEAK_PASSWORD_MESSAGE};
use crate::error::{AppError, AppResult};
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use validator::{ValidationError, ValidationErrors};

lazy_static! {
    static ref FULL_NAME: Regex = Regex::new(r"^[a-zA-Z]+\s[a-zA-Z]+$").unwrap();
    static ref EMAIL: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
}

pub const NAME_FORMAT_MESSAGE: &str =
    "Name format is incorrect. Please use '{name} {familyname}' format.";
pub const SAME_PERSON_MESSAGE: &str = "The two people must be different.";
pub const INVALID_EMAIL_MESSAGE: &str = "Invalid email format.";

/// `First Last`: two alphabetic words separated by one whitespace character
pub fn is_valid_full_name(name: &str) -> bool {
    !name.trim().is_empty() && FULL_NAME.is_match(name)
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// Both names well-formed and naming different people
pub fn validate_person_pair(first: &str, second: &str) -> AppResult<()> {
    if !is_valid_full_name(first) || !is_valid_full_name(second) {
        return Err(AppError::Validation(NAME_FORMAT_MESSAGE.to_string()));
    }

    if first == second {
        return Err(AppError::Validation(SAME_PERSON_MESSAGE.to_string()));
    }

    Ok(())
}

/// `validator` rule for email fields
pub fn validate_email_format(email: &str) -> Result<(), ValidationError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ValidationError::new("email").with_message(Cow::Borrowed(INVALID_EMAIL_MESSAGE)))
    }
}

/// `validator` rule for new passwords
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if is_strong_password(password) {
        Ok(())
    } else {
        Err(ValidationError::new("password").with_message(Cow::Borrowed(WEAK_PASSWORD_MESSAGE)))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "Invalid request".to_string());
        AppError::Validation(message)
    }
}
