//! User repository for skyvault.
//!
//! This module provides CRUD operations for users in the database.

use sqlx::QueryBuilder;
use tracing::debug;

use super::user::{NewUser, User, UserUpdate};
use super::DbPool;
use crate::{Result, VaultError};

const USER_COLUMNS: &str = "id, name, email, password, picture, role, max_storage_bytes,
                            root_dir_id, deleted, created_at";

/// Repository for user CRUD operations.
pub struct UserRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new UserRepository with the given database pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a user together with their root directory.
    ///
    /// Both records are written in one transaction: either the user exists
    /// with a root directory, or neither does.
    pub async fn create_with_root(&self, new_user: &NewUser) -> Result<User> {
        let mut tx = self.pool.begin().await?;

        let user_id: i64 = sqlx::query_scalar(
            "INSERT INTO users (name, email, password, picture, role, max_storage_bytes)
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.password)
        .bind(&new_user.picture)
        .bind(new_user.role.as_str())
        .bind(new_user.max_storage_bytes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_email(e, &new_user.email))?;

        let root_dir_id: i64 = sqlx::query_scalar(
            "INSERT INTO directories (name, parent_id, owner_id, size)
             VALUES (?, NULL, ?, 0) RETURNING id",
        )
        .bind(format!("root-{}", new_user.email))
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET root_dir_id = ? WHERE id = ?")
            .bind(root_dir_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(user_id, root_dir_id, "Created user with root directory");

        self.get_by_id(user_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("user".to_string()))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ? COLLATE NOCASE"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(user)
    }

    /// Update a user by ID.
    ///
    /// Only fields that are set in the update will be modified.
    /// Returns the updated user, or None if not found.
    pub async fn update(&self, id: i64, update: &UserUpdate) -> Result<Option<User>> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE users SET ");
        let mut separated = query.separated(", ");

        if let Some(ref name) = update.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name.clone());
        }
        if let Some(ref picture) = update.picture {
            separated.push("picture = ");
            separated.push_bind_unseparated(picture.clone());
        }
        if let Some(role) = update.role {
            separated.push("role = ");
            separated.push_bind_unseparated(role.as_str().to_string());
        }
        if let Some(max_storage_bytes) = update.max_storage_bytes {
            separated.push("max_storage_bytes = ");
            separated.push_bind_unseparated(max_storage_bytes);
        }
        if let Some(deleted) = update.deleted {
            separated.push("deleted = ");
            separated.push_bind_unseparated(deleted);
        }

        query.push(" WHERE id = ");
        query.push_bind(id);

        let result = query.build().execute(self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Soft-delete a user. Returns true if the flag changed.
    pub async fn soft_delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET deleted = 1 WHERE id = ? AND deleted = 0")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List all users that are not soft-deleted.
    pub async fn list_active(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted = 0 ORDER BY id"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(users)
    }

    /// Check if an email is already registered (case-insensitive).
    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = ? COLLATE NOCASE)")
                .bind(email)
                .fetch_one(self.pool)
                .await?;
        Ok(exists)
    }
}

fn map_unique_email(e: sqlx::Error, email: &str) -> VaultError {
    match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            VaultError::Validation(format!("email {email} is already registered"))
        }
        _ => e.into(),
    }
}
