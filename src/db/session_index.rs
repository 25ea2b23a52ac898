//! Durable per-user session index.
//!
//! Rows here mirror sessions written to the expiring cache so that sessions
//! can be enumerated per user and revoked administratively. The cache stays
//! authoritative for validity; a row may outlive its cache entry.

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::Result;

/// Session index entity.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionIndexEntry {
    /// Session identifier (cache key suffix).
    pub session_id: String,
    /// Owning user.
    pub user_id: i64,
    /// Root directory of the owning user.
    pub root_dir_id: i64,
    /// How the session was established (e.g. "password", "google").
    pub auth_method: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

/// New session index entry for creation.
#[derive(Debug, Clone)]
pub struct NewSessionIndexEntry {
    /// Session identifier.
    pub session_id: String,
    /// Owning user.
    pub user_id: i64,
    /// Root directory of the owning user.
    pub root_dir_id: i64,
    /// How the session was established.
    pub auth_method: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

/// Repository for session index operations.
pub struct SessionIndexRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SessionIndexRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert (or replace) an index entry.
    pub async fn insert(&self, entry: &NewSessionIndexEntry) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sessions
                (session_id, user_id, root_dir_id, auth_method, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.session_id)
        .bind(entry.user_id)
        .bind(entry.root_dir_id)
        .bind(&entry.auth_method)
        .bind(entry.created_at)
        .bind(entry.expires_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Get an entry by session ID.
    pub async fn get(&self, session_id: &str) -> Result<Option<SessionIndexEntry>> {
        let entry = sqlx::query_as::<_, SessionIndexEntry>(
            "SELECT session_id, user_id, root_dir_id, auth_method, created_at, expires_at
             FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(entry)
    }

    /// List entries for a user, oldest first.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<SessionIndexEntry>> {
        let entries = sqlx::query_as::<_, SessionIndexEntry>(
            "SELECT session_id, user_id, root_dir_id, auth_method, created_at, expires_at
             FROM sessions WHERE user_id = ? ORDER BY created_at, session_id",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(entries)
    }

    /// List distinct users with at least one unexpired entry.
    pub async fn list_user_ids_with_sessions(&self, now: DateTime<Utc>) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT user_id FROM sessions WHERE expires_at > ? ORDER BY user_id",
        )
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        Ok(ids)
    }

    /// Delete an entry. Returns true if a row was removed.
    pub async fn delete(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete all entries for a user.
    pub async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Delete entries that expired before `now`.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
