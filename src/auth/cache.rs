//! Expiring session cache.
//!
//! The cache is the authority on whether a session is valid. Entries carry
//! their own time-to-live and vanish once it passes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::Result;

/// Cache key prefix for session entries.
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Cache key for a session ID.
pub fn session_key(session_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{session_id}")
}

/// Payload stored under a session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Owning user.
    pub user_id: i64,
    /// Root directory of the owning user.
    pub root_dir_id: i64,
    /// How the session was established.
    pub auth_method: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A live cache entry returned by a secondary lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSession {
    /// Full cache key (`session:<id>`).
    pub key: String,
    /// Stored payload.
    pub record: SessionRecord,
}

impl CachedSession {
    /// Session ID without the key prefix.
    pub fn session_id(&self) -> &str {
        self.key
            .strip_prefix(SESSION_KEY_PREFIX)
            .unwrap_or(&self.key)
    }
}

/// Expiring key-value store for sessions.
///
/// Implementations report an unreachable backend as
/// [`VaultError::TransientDependency`](crate::VaultError::TransientDependency).
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Store `record` under `key` for `ttl`.
    async fn set(&self, key: &str, record: &SessionRecord, ttl: Duration) -> Result<()>;

    /// Fetch a live entry.
    async fn get(&self, key: &str) -> Result<Option<SessionRecord>>;

    /// Delete an entry. Returns true if a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// All live entries for a user.
    async fn find_by_user(&self, user_id: i64) -> Result<Vec<CachedSession>>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

#[derive(Debug, Clone)]
struct Entry {
    record: SessionRecord,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// In-process session cache.
///
/// Expired entries are ignored on read and dropped by
/// [`SessionCache::purge_expired`].
#[derive(Debug, Default)]
pub struct MemorySessionCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemorySessionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SessionCache for MemorySessionCache {
    async fn set(&self, key: &str, record: &SessionRecord, ttl: Duration) -> Result<()> {
        let entry = Entry {
            record: record.clone(),
            expires_at: Utc::now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<SessionRecord>> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.record.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Utc::now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<CachedSession>> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(_, e)| e.record.user_id == user_id && e.is_live(now))
            .map(|(key, e)| CachedSession {
                key: key.clone(),
                record: e.record.clone(),
            })
            .collect())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok(before - entries.len())
    }
}
