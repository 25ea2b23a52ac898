//! Password hashing and validation for skyvault.
//!
//! Uses Argon2id for password hashing.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use rand_core::OsRng;
use thiserror::Error;

use crate::VaultError;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length.
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Password-related errors.
#[derive(Error, Debug)]
pub enum PasswordError {
    /// Password is too short.
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters")]
    TooShort,

    /// Password is too long.
    #[error("password must be at most {MAX_PASSWORD_LENGTH} characters")]
    TooLong,

    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    HashError(String),

    /// Password hash is invalid.
    #[error("invalid password hash format")]
    InvalidHash,

    /// Password verification failed (wrong password).
    #[error("password verification failed")]
    VerificationFailed,
}

impl From<PasswordError> for VaultError {
    fn from(e: PasswordError) -> Self {
        match e {
            PasswordError::TooShort | PasswordError::TooLong => VaultError::Validation(e.to_string()),
            PasswordError::HashError(_) => VaultError::Internal(e.to_string()),
            PasswordError::InvalidHash | PasswordError::VerificationFailed => {
                VaultError::Auth("invalid credentials".to_string())
            }
        }
    }
}

/// Create the Argon2 hasher.
///
/// Parameters:
/// - Memory cost: 64 MB (65536 KiB)
/// - Time cost: 3 iterations
/// - Parallelism: 4 threads
fn create_argon2() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(65536, 3, 4, None)
        .map_err(|e| PasswordError::HashError(e.to_string()))?;
    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

/// Hash a password using Argon2id.
///
/// Returns a PHC-formatted hash string that includes the salt and parameters.
///
/// # Examples
///
/// ```
/// use skyvault::auth::hash_password;
///
/// let hash = hash_password("my_secure_password").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    validate_password(password)?;

    let salt = SaltString::generate(&mut OsRng);
    let hash = create_argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashError(e.to_string()))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// Parameters are read from the stored hash.
pub fn verify_password(password: &str, hash: &str) -> Result<(), PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHash)?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| PasswordError::VerificationFailed)
}

/// Check password length limits.
pub fn validate_password(password: &str) -> Result<(), PasswordError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(PasswordError::TooLong);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("correct_password").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("$v=19$"));

        assert!(verify_password("correct_password", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong_password", &hash),
            Err(PasswordError::VerificationFailed)
        ));
    }

    #[test]
    fn test_salted_hashes_differ() {
        let hash1 = hash_password("same_password").unwrap();
        let hash2 = hash_password("same_password").unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_invalid_hash() {
        assert!(matches!(
            verify_password("any_password", "not_a_valid_hash"),
            Err(PasswordError::InvalidHash)
        ));
    }

    #[test]
    fn test_length_limits() {
        assert!(matches!(validate_password("short"), Err(PasswordError::TooShort)));
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password(&"a".repeat(128)).is_ok());
        assert!(matches!(
            hash_password(&"a".repeat(129)),
            Err(PasswordError::TooLong)
        ));
    }

    #[test]
    fn test_into_vault_error() {
        let err: VaultError = PasswordError::VerificationFailed.into();
        assert!(matches!(err, VaultError::Auth(_)));
        let err: VaultError = PasswordError::TooShort.into();
        assert!(matches!(err, VaultError::Validation(_)));
    }
}
