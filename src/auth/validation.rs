//! Input validation for skyvault accounts.
//!
//! This module provides validation functions for display names, emails and
//! registration passwords.

use thiserror::Error;

use super::password::{MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};
use crate::VaultError;

/// Minimum display name length.
pub const MIN_NAME_LENGTH: usize = 3;

/// Maximum display name length.
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum email length.
pub const MAX_EMAIL_LENGTH: usize = 254;

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Name is too short.
    #[error("name must be at least {MIN_NAME_LENGTH} characters")]
    NameTooShort,

    /// Name is too long.
    #[error("name must be at most {MAX_NAME_LENGTH} characters")]
    NameTooLong,

    /// Name contains control characters.
    #[error("name contains invalid characters")]
    NameInvalidChars,

    /// Email is too long.
    #[error("email must be at most {MAX_EMAIL_LENGTH} characters")]
    EmailTooLong,

    /// Email format is invalid.
    #[error("invalid email format")]
    EmailInvalidFormat,

    /// Password is too short.
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    PasswordTooShort,

    /// Password is too long.
    #[error("password must be at most {MAX_PASSWORD_LENGTH} characters")]
    PasswordTooLong,

    /// Password equals the email address.
    #[error("password cannot be the same as email")]
    PasswordSameAsEmail,
}

impl From<ValidationError> for VaultError {
    fn from(e: ValidationError) -> Self {
        VaultError::Validation(e.to_string())
    }
}

/// Validate a display name.
///
/// # Examples
///
/// ```
/// use skyvault::auth::validation::validate_name;
///
/// assert!(validate_name("Ann Lee").is_ok());
/// assert!(validate_name("Al").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let count = name.trim().chars().count();
    if count < MIN_NAME_LENGTH {
        return Err(ValidationError::NameTooShort);
    }
    if count > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong);
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(ValidationError::NameInvalidChars);
    }
    Ok(())
}

/// Validate an email address.
///
/// Only a basic shape check: one `@`, a non-empty local part and a dotted
/// domain without whitespace.
///
/// # Examples
///
/// ```
/// use skyvault::auth::validation::validate_email;
///
/// assert!(validate_email("user@example.com").is_ok());
/// assert!(validate_email("invalid").is_err());
/// ```
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::EmailTooLong);
    }
    if email.chars().any(|c| c.is_whitespace()) {
        return Err(ValidationError::EmailInvalidFormat);
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or(ValidationError::EmailInvalidFormat)?;
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(ValidationError::EmailInvalidFormat);
    }
    if domain.split('.').any(str::is_empty) {
        return Err(ValidationError::EmailInvalidFormat);
    }

    Ok(())
}

/// Validate a password chosen at registration.
pub fn validate_registration_password(password: &str, email: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort);
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooLong);
    }
    if password.eq_ignore_ascii_case(email) {
        return Err(ValidationError::PasswordSameAsEmail);
    }
    Ok(())
}

/// Validate all registration fields at once.
///
/// Returns the first validation error encountered.
pub fn validate_registration(name: &str, email: &str, password: &str) -> Result<(), ValidationError> {
    validate_name(name)?;
    validate_email(email)?;
    validate_registration_password(password, email)?;
    Ok(())
}
