//! User management for administrators.
//!
//! This module provides account-level operations:
//! - Current user summary (any authenticated user)
//! - List users with login state (Manager and above)
//! - Log a user out everywhere (Manager and above)
//! - Soft-delete an account (Admin only)

use chrono::Utc;
use std::collections::HashSet;
use tracing::info;

use crate::auth::{require_admin, require_manager, SessionManager};
use crate::db::{Database, Role, SessionIndexRepository, User, UserRepository};
use crate::file::DirectoryRepository;
use crate::{Result, VaultError};

use super::ensure_not_self;

/// Account summary shown to the account owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Avatar URL.
    pub picture: String,
    /// Role.
    pub role: Role,
    /// Storage ceiling in bytes.
    pub max_storage_bytes: i64,
    /// Bytes charged against the quota (root directory size).
    pub used_storage_bytes: i64,
}

/// One row of the administrative user list.
#[derive(Debug, Clone)]
pub struct UserListEntry {
    /// User information.
    pub user: User,
    /// Whether the durable index holds an unexpired session for the user.
    pub is_logged_in: bool,
}

/// Admin service for user management.
pub struct UserAdminService<'a> {
    db: &'a Database,
    sessions: &'a SessionManager<'a>,
}

impl<'a> UserAdminService<'a> {
    /// Create a new UserAdminService.
    pub fn new(db: &'a Database, sessions: &'a SessionManager<'a>) -> Self {
        Self { db, sessions }
    }

    /// Summary of the given account including used storage.
    pub async fn current_user(&self, user_id: i64) -> Result<UserSummary> {
        let user = self.get_user(user_id).await?;
        if user.deleted {
            return Err(VaultError::AccountDeleted);
        }

        let used_storage_bytes = match user.root_dir_id {
            Some(root_id) => DirectoryRepository::new(self.db.pool())
                .get_by_id(root_id)
                .await?
                .map(|dir| dir.size)
                .unwrap_or(0),
            None => 0,
        };

        Ok(UserSummary {
            name: user.name,
            email: user.email,
            picture: user.picture,
            role: user.role,
            max_storage_bytes: user.max_storage_bytes,
            used_storage_bytes,
        })
    }

    /// List non-deleted users with their login state.
    ///
    /// Login state comes from the durable session index, so it may lag the
    /// cache by up to one session lifetime.
    pub async fn list_users(&self, actor: &User) -> Result<Vec<UserListEntry>> {
        require_manager(actor)?;

        let users = UserRepository::new(self.db.pool()).list_active().await?;
        let logged_in: HashSet<i64> = SessionIndexRepository::new(self.db.pool())
            .list_user_ids_with_sessions(Utc::now())
            .await?
            .into_iter()
            .collect();

        Ok(users
            .into_iter()
            .map(|user| UserListEntry {
                is_logged_in: logged_in.contains(&user.id),
                user,
            })
            .collect())
    }

    /// Revoke every session of a user. Returns the number revoked.
    pub async fn logout_user(&self, actor: &User, user_id: i64) -> Result<usize> {
        require_manager(actor)?;
        self.get_user(user_id).await?;

        let revoked = self.sessions.revoke_all(user_id).await?;
        info!(actor_id = actor.id, user_id, revoked, "Logged out user");
        Ok(revoked)
    }

    /// Soft-delete an account and revoke its sessions.
    pub async fn delete_user(&self, actor: &User, user_id: i64) -> Result<()> {
        require_admin(actor)?;
        ensure_not_self(actor, user_id)?;
        self.get_user(user_id).await?;

        UserRepository::new(self.db.pool()).soft_delete(user_id).await?;
        let revoked = self.sessions.revoke_all(user_id).await?;
        info!(actor_id = actor.id, user_id, revoked, "Deleted user");
        Ok(())
    }

    async fn get_user(&self, user_id: i64) -> Result<User> {
        UserRepository::new(self.db.pool())
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("user".to_string()))
    }
}
