//! Permission checking for skyvault.
//!
//! Role-based checks for administrative operations.

use thiserror::Error;

use crate::db::{Role, User};
use crate::VaultError;

/// Permission-related errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    /// User does not have sufficient permission.
    #[error("this operation requires the {0} role or higher")]
    InsufficientRole(Role),

    /// User account has been deleted.
    #[error("account has been deleted")]
    AccountDeleted,
}

impl From<PermissionError> for VaultError {
    fn from(e: PermissionError) -> Self {
        match e {
            PermissionError::InsufficientRole(_) => VaultError::Permission(e.to_string()),
            PermissionError::AccountDeleted => VaultError::AccountDeleted,
        }
    }
}

/// Check if a user has the required permission level.
///
/// # Examples
///
/// ```
/// use skyvault::auth::permission::{check_permission, PermissionError};
/// use skyvault::db::{Role, User};
///
/// let user = User {
///     id: 1,
///     name: "Ann".to_string(),
///     email: "ann@example.com".to_string(),
///     password: None,
///     picture: String::new(),
///     role: Role::User,
///     max_storage_bytes: 0,
///     root_dir_id: Some(1),
///     deleted: false,
///     created_at: String::new(),
/// };
/// assert!(check_permission(&user, Role::User).is_ok());
/// assert_eq!(
///     check_permission(&user, Role::Admin),
///     Err(PermissionError::InsufficientRole(Role::Admin))
/// );
/// ```
pub fn check_permission(user: &User, required: Role) -> Result<(), PermissionError> {
    if user.deleted {
        return Err(PermissionError::AccountDeleted);
    }
    if !user.role.can_access(required) {
        return Err(PermissionError::InsufficientRole(required));
    }
    Ok(())
}

/// Require at least the Manager role.
pub fn require_manager(user: &User) -> Result<(), PermissionError> {
    check_permission(user, Role::Manager)
}

/// Require the Admin role.
pub fn require_admin(user: &User) -> Result<(), PermissionError> {
    check_permission(user, Role::Admin)
}
