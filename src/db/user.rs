//! User model for skyvault.
//!
//! This module defines the User struct and Role enum for account management.

use std::fmt;
use std::str::FromStr;

/// User role for permission management.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Role {
    /// Regular account owner.
    #[default]
    User = 0,
    /// Can view accounts and end their sessions.
    Manager = 1,
    /// Full administrative access.
    Admin = 2,
}

impl Role {
    /// Convert role to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Manager => "manager",
            Role::Admin => "admin",
        }
    }

    /// Check if this role has at least the required permission level.
    ///
    /// # Examples
    ///
    /// ```
    /// use skyvault::db::Role;
    ///
    /// assert!(Role::Admin.can_access(Role::Manager));
    /// assert!(Role::Manager.can_access(Role::Manager));
    /// assert!(!Role::User.can_access(Role::Manager));
    /// ```
    pub fn can_access(&self, required: Role) -> bool {
        *self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "manager" => Ok(Role::Manager),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// User entity.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    /// Unique user ID.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Email address (unique, case-insensitive).
    pub email: String,
    /// Password hash (Argon2). `None` for identity-provider accounts.
    pub password: Option<String>,
    /// Avatar URL.
    pub picture: String,
    /// User role for permissions.
    #[sqlx(try_from = "String")]
    pub role: Role,
    /// Storage ceiling in bytes.
    pub max_storage_bytes: i64,
    /// Root directory of the user's tree.
    pub root_dir_id: Option<i64>,
    /// Soft-delete flag. Deleted users may not authenticate.
    pub deleted: bool,
    /// Account creation timestamp.
    pub created_at: String,
}

impl User {
    /// Check if this user has at least the required role level.
    pub fn has_role(&self, required: Role) -> bool {
        self.role >= required
    }

    /// Check if this user is an administrator.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Data for creating a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Password hash (pre-hashed with Argon2), if any.
    pub password: Option<String>,
    /// Avatar URL.
    pub picture: String,
    /// User role (defaults to User).
    pub role: Role,
    /// Storage ceiling in bytes.
    pub max_storage_bytes: i64,
}

impl NewUser {
    /// Create a new user with minimal required fields.
    pub fn new(name: impl Into<String>, email: impl Into<String>, max_storage_bytes: i64) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: None,
            picture: String::new(),
            role: Role::User,
            max_storage_bytes,
        }
    }

    /// Set the password hash.
    pub fn with_password(mut self, hash: impl Into<String>) -> Self {
        self.password = Some(hash.into());
        self
    }

    /// Set the avatar URL.
    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = picture.into();
        self
    }

    /// Set the role.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

/// Data for updating an existing user.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New avatar URL.
    pub picture: Option<String>,
    /// New role.
    pub role: Option<Role>,
    /// New storage ceiling.
    pub max_storage_bytes: Option<i64>,
    /// New soft-delete flag.
    pub deleted: Option<bool>,
}

impl UserUpdate {
    /// Create an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set new display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set new avatar URL.
    pub fn picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }

    /// Set new role.
    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Set new storage ceiling.
    pub fn max_storage_bytes(mut self, bytes: i64) -> Self {
        self.max_storage_bytes = Some(bytes);
        self
    }

    /// Set soft-delete flag.
    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = Some(deleted);
        self
    }

    /// Check if any fields are set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.picture.is_none()
            && self.role.is_none()
            && self.max_storage_bytes.is_none()
            && self.deleted.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user(role: Role) -> User {
        User {
            id: 1,
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
            password: None,
            picture: String::new(),
            role,
            max_storage_bytes: 1000,
            root_dir_id: Some(1),
            deleted: false,
            created_at: "2024-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::User < Role::Manager);
        assert!(Role::Manager < Role::Admin);
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("user").unwrap(), Role::User);
        assert_eq!(Role::from_str("Manager").unwrap(), Role::Manager);
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);
        assert!(Role::from_str("sysop").is_err());
    }

    #[test]
    fn test_role_try_from_string() {
        assert_eq!(Role::try_from("admin".to_string()).unwrap(), Role::Admin);
        assert!(Role::try_from(String::new()).is_err());
    }

    #[test]
    fn test_role_default_and_display() {
        assert_eq!(Role::default(), Role::User);
        assert_eq!(format!("{}", Role::Manager), "manager");
    }

    #[test]
    fn test_new_user_builder() {
        let user = NewUser::new("Ann", "ann@example.com", 500)
            .with_password("hash")
            .with_picture("https://pics.example.com/ann.png")
            .with_role(Role::Admin);

        assert_eq!(user.name, "Ann");
        assert_eq!(user.email, "ann@example.com");
        assert_eq!(user.password.as_deref(), Some("hash"));
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.max_storage_bytes, 500);
    }

    #[test]
    fn test_user_update_builder() {
        let update = UserUpdate::new().deleted(true).max_storage_bytes(10);
        assert_eq!(update.deleted, Some(true));
        assert_eq!(update.max_storage_bytes, Some(10));
        assert!(!update.is_empty());
        assert!(UserUpdate::new().is_empty());
    }

    #[test]
    fn test_user_has_role() {
        let manager = sample_user(Role::Manager);
        assert!(manager.has_role(Role::User));
        assert!(manager.has_role(Role::Manager));
        assert!(!manager.has_role(Role::Admin));
        assert!(!manager.is_admin());
        assert!(sample_user(Role::Admin).is_admin());
    }
}
