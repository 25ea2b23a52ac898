//! One-time verification codes for email ownership.
//!
//! At most one code is outstanding per email; issuing again replaces it.
//! A code is spent by deleting its row, so a successful consume can only
//! happen once even under concurrent requests.

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::Result;

/// Outstanding verification code.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OneTimeCode {
    /// Email the code was sent to.
    pub email: String,
    /// The code itself.
    pub code: String,
    /// Issue timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp.
    pub expires_at: DateTime<Utc>,
}

/// Repository for one-time verification codes.
pub struct OneTimeCodeRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> OneTimeCodeRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Store `code` for `email`, replacing any code issued before.
    pub async fn upsert(
        &self,
        email: &str,
        code: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<OneTimeCode> {
        let stored = sqlx::query_as::<_, OneTimeCode>(
            "INSERT INTO one_time_codes (email, code, created_at, expires_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET
                 code = excluded.code,
                 created_at = excluded.created_at,
                 expires_at = excluded.expires_at
             RETURNING email, code, created_at, expires_at",
        )
        .bind(email)
        .bind(code)
        .bind(created_at)
        .bind(expires_at)
        .fetch_one(self.pool)
        .await?;

        Ok(stored)
    }

    /// Get the outstanding code for an email, expired or not.
    pub async fn get(&self, email: &str) -> Result<Option<OneTimeCode>> {
        let code = sqlx::query_as::<_, OneTimeCode>(
            "SELECT email, code, created_at, expires_at FROM one_time_codes WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(code)
    }

    /// Check a code without spending it.
    pub async fn matches(&self, email: &str, code: &str, now: DateTime<Utc>) -> Result<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM one_time_codes
             WHERE email = ? AND code = ? AND expires_at > ?)",
        )
        .bind(email)
        .bind(code)
        .bind(now)
        .fetch_one(self.pool)
        .await?;

        Ok(found)
    }

    /// Spend a code. Returns false if it does not match, has expired or was
    /// already spent.
    pub async fn consume(&self, email: &str, code: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM one_time_codes WHERE email = ? AND code = ? AND expires_at > ?",
        )
        .bind(email)
        .bind(code)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete codes past their expiry. Returns the number removed.
    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM one_time_codes WHERE expires_at <= ?")
            .bind(now)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
