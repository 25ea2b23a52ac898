//! Identity resolution for skyvault.
//!
//! Turns a verified identity (provider profile or email + password) into a
//! user with a root directory, then hands off to the session manager.

use tracing::{info, warn};

use super::otp::OtpService;
use super::password::{hash_password, verify_password};
use super::session::{IssuedSession, SessionManager};
use super::validation::{validate_email, validate_name, validate_registration};
use crate::db::{NewUser, User, UserRepository, UserUpdate};
use crate::{Database, Result, VaultError};

/// Auth method recorded for password logins.
pub const PASSWORD_AUTH_METHOD: &str = "password";

/// Profile returned by an identity provider.
#[derive(Debug, Clone)]
pub struct IdentityProfile {
    /// Display name.
    pub name: String,
    /// Verified email address.
    pub email: String,
    /// Avatar URL.
    pub picture: String,
}

impl IdentityProfile {
    /// Create a new profile.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        picture: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            picture: picture.into(),
        }
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// The authenticated user.
    pub user: User,
    /// The session issued for them.
    pub session: IssuedSession,
}

/// Resolver for finding or creating accounts.
pub struct IdentityResolver<'a> {
    db: &'a Database,
    sessions: &'a SessionManager<'a>,
    default_max_storage_bytes: i64,
}

impl<'a> IdentityResolver<'a> {
    /// Create a new IdentityResolver granting new accounts
    /// `default_max_storage_bytes` of quota.
    pub fn new(
        db: &'a Database,
        sessions: &'a SessionManager<'a>,
        default_max_storage_bytes: i64,
    ) -> Self {
        Self {
            db,
            sessions,
            default_max_storage_bytes,
        }
    }

    /// Find or create the account for a provider profile and log it in.
    ///
    /// New accounts are created together with their root directory in one
    /// transaction. Soft-deleted accounts are refused.
    pub async fn resolve(&self, profile: &IdentityProfile, auth_method: &str) -> Result<LoginOutcome> {
        validate_email(&profile.email)?;
        let repo = UserRepository::new(self.db.pool());

        let user = match repo.get_by_email(&profile.email).await? {
            Some(existing) => self.refresh_profile(existing, profile).await?,
            None => {
                validate_name(&profile.name)?;
                let new_user = NewUser::new(
                    profile.name.trim(),
                    &profile.email,
                    self.default_max_storage_bytes,
                )
                .with_picture(&profile.picture);
                match repo.create_with_root(&new_user).await {
                    Ok(user) => {
                        info!(user_id = user.id, auth_method, "Created account");
                        user
                    }
                    // Lost a race with a concurrent first login.
                    Err(VaultError::Validation(_)) => repo
                        .get_by_email(&profile.email)
                        .await?
                        .ok_or_else(|| VaultError::NotFound("user".to_string()))?,
                    Err(e) => return Err(e),
                }
            }
        };

        if user.deleted {
            return Err(VaultError::AccountDeleted);
        }
        self.start_session(user, auth_method).await
    }

    /// Register a password account.
    ///
    /// `code` must be an outstanding verification code issued to `email`
    /// through [`OtpService::issue`]; it is spent on success.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        code: &str,
    ) -> Result<User> {
        validate_registration(name, email, password)?;

        let repo = UserRepository::new(self.db.pool());
        if repo.email_exists(email).await? {
            return Err(VaultError::Validation(format!("email {email} is already registered")));
        }
        OtpService::new(self.db).consume(email, code).await?;

        let hash = hash_password(password)?;
        let user = repo
            .create_with_root(
                &NewUser::new(name.trim(), email, self.default_max_storage_bytes)
                    .with_password(hash),
            )
            .await?;

        info!(user_id = user.id, "Registered account");
        Ok(user)
    }

    /// Log in with email and password.
    pub async fn login_with_password(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let invalid = || VaultError::Auth("invalid credentials".to_string());

        let user = UserRepository::new(self.db.pool())
            .get_by_email(email)
            .await?
            .ok_or_else(invalid)?;
        let hash = user.password.as_deref().ok_or_else(invalid)?;
        if verify_password(password, hash).is_err() {
            warn!(user_id = user.id, "Failed password login");
            return Err(invalid());
        }
        if user.deleted {
            return Err(VaultError::AccountDeleted);
        }

        self.start_session(user, PASSWORD_AUTH_METHOD).await
    }

    async fn refresh_profile(&self, user: User, profile: &IdentityProfile) -> Result<User> {
        if user.deleted || profile.picture.is_empty() || profile.picture == user.picture {
            return Ok(user);
        }

        let updated = UserRepository::new(self.db.pool())
            .update(user.id, &UserUpdate::new().picture(&profile.picture))
            .await?;
        Ok(updated.unwrap_or(user))
    }

    async fn start_session(&self, user: User, auth_method: &str) -> Result<LoginOutcome> {
        let root_dir_id = user
            .root_dir_id
            .ok_or_else(|| VaultError::NotFound("root directory".to_string()))?;
        let session = self.sessions.create(user.id, root_dir_id, auth_method).await?;
        Ok(LoginOutcome { user, session })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemorySessionCache;

    const QUOTA: i64 = 15 * 1024 * 1024 * 1024;

    #[tokio::test]
    async fn test_resolve_creates_user_with_root() {
        let db = Database::open_in_memory().await.unwrap();
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache);
        let resolver = IdentityResolver::new(&db, &sessions, QUOTA);

        let profile = IdentityProfile::new("Ann Lee", "ann@example.com", "https://p/ann.png");
        let outcome = resolver.resolve(&profile, "google").await.unwrap();

        assert_eq!(outcome.user.max_storage_bytes, QUOTA);
        assert_eq!(outcome.user.picture, "https://p/ann.png");
        let record = sessions.validate(&outcome.session.session_id).await.unwrap();
        assert_eq!(record.user_id, outcome.user.id);
        assert_eq!(Some(record.root_dir_id), outcome.user.root_dir_id);
        assert_eq!(record.auth_method, "google");
    }

    #[tokio::test]
    async fn test_resolve_existing_updates_picture() {
        let db = Database::open_in_memory().await.unwrap();
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache);
        let resolver = IdentityResolver::new(&db, &sessions, QUOTA);

        let first = resolver
            .resolve(&IdentityProfile::new("Ann", "ann@example.com", "old.png"), "google")
            .await
            .unwrap();
        let second = resolver
            .resolve(&IdentityProfile::new("Ann", "ANN@example.com", "new.png"), "github")
            .await
            .unwrap();

        assert_eq!(first.user.id, second.user.id);
        assert_eq!(second.user.picture, "new.png");
    }

    #[tokio::test]
    async fn test_resolve_rejects_deleted() {
        let db = Database::open_in_memory().await.unwrap();
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache);
        let resolver = IdentityResolver::new(&db, &sessions, QUOTA);

        let outcome = resolver
            .resolve(&IdentityProfile::new("Ann", "ann@example.com", ""), "google")
            .await
            .unwrap();
        UserRepository::new(db.pool())
            .soft_delete(outcome.user.id)
            .await
            .unwrap();

        let err = resolver
            .resolve(&IdentityProfile::new("Ann", "ann@example.com", ""), "google")
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::AccountDeleted));
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let db = Database::open_in_memory().await.unwrap();
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache);
        let resolver = IdentityResolver::new(&db, &sessions, 1000);
        let otp = OtpService::new(&db);

        let issued = otp.issue("bob@example.com").await.unwrap();
        let user = resolver
            .register("Bob", "bob@example.com", "correct horse", &issued.code)
            .await
            .unwrap();
        assert!(user.password.is_some());
        assert!(user.root_dir_id.is_some());

        let again = otp.issue("bob@example.com").await.unwrap();
        assert!(matches!(
            resolver
                .register("Bob", "bob@example.com", "another pass", &again.code)
                .await,
            Err(VaultError::Validation(_))
        ));

        let outcome = resolver
            .login_with_password("bob@example.com", "correct horse")
            .await
            .unwrap();
        assert_eq!(outcome.user.id, user.id);

        for (email, password) in [
            ("bob@example.com", "wrong password"),
            ("nobody@example.com", "correct horse"),
        ] {
            assert!(matches!(
                resolver.login_with_password(email, password).await,
                Err(VaultError::Auth(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_register_requires_verification_code() {
        let db = Database::open_in_memory().await.unwrap();
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache);
        let resolver = IdentityResolver::new(&db, &sessions, 1000);
        let users = UserRepository::new(db.pool());

        // No code issued yet.
        assert!(matches!(
            resolver
                .register("Cat", "cat@example.com", "correct horse", "000000")
                .await,
            Err(VaultError::Validation(_))
        ));

        // A code sent to another address does not count.
        let foreign = OtpService::new(&db).issue("dog@example.com").await.unwrap();
        assert!(resolver
            .register("Cat", "cat@example.com", "correct horse", &foreign.code)
            .await
            .is_err());

        // Expired codes are refused.
        let expired = OtpService::new(&db)
            .with_ttl(chrono::Duration::seconds(-1))
            .issue("cat@example.com")
            .await
            .unwrap();
        assert!(resolver
            .register("Cat", "cat@example.com", "correct horse", &expired.code)
            .await
            .is_err());
        assert!(!users.email_exists("cat@example.com").await.unwrap());

        // A valid code works once and only once.
        let issued = OtpService::new(&db).issue("cat@example.com").await.unwrap();
        resolver
            .register("Cat", "cat@example.com", "correct horse", &issued.code)
            .await
            .unwrap();
        assert!(!OtpService::new(&db)
            .verify("cat@example.com", &issued.code)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_provider_account_cannot_password_login() {
        let db = Database::open_in_memory().await.unwrap();
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache);
        let resolver = IdentityResolver::new(&db, &sessions, 1000);

        resolver
            .resolve(&IdentityProfile::new("Ann", "ann@example.com", ""), "google")
            .await
            .unwrap();
        assert!(matches!(
            resolver.login_with_password("ann@example.com", "whatever123").await,
            Err(VaultError::Auth(_))
        ));
    }
}
