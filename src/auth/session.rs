//! Session lifecycle management for skyvault.
//!
//! Sessions live in two places: the expiring [`SessionCache`], which decides
//! whether a session is valid, and the durable session index, which lets a
//! user's sessions be listed and revoked administratively. Writes to the
//! index are best-effort; an index row without a cache entry is treated as
//! expired.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::cache::{session_key, SessionCache, SessionRecord};
use crate::config::SessionConfig;
use crate::db::{NewSessionIndexEntry, SessionIndexEntry, SessionIndexRepository};
use crate::{Database, Result, VaultError};

/// Default session lifetime (7 days).
pub const DEFAULT_SESSION_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Default number of concurrent sessions per user.
pub const DEFAULT_MAX_ACTIVE_SESSIONS: usize = 2;

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// Session identifier for the client cookie.
    pub session_id: String,
    /// Lifetime of the session.
    pub ttl: Duration,
    /// When the session expires.
    pub expires_at: DateTime<Utc>,
}

/// Manager for issuing, validating and revoking sessions.
pub struct SessionManager<'a> {
    db: &'a Database,
    cache: &'a dyn SessionCache,
    ttl: Duration,
    max_active: usize,
}

impl<'a> SessionManager<'a> {
    /// Create a new SessionManager with default lifetime and cap.
    pub fn new(db: &'a Database, cache: &'a dyn SessionCache) -> Self {
        Self {
            db,
            cache,
            ttl: Duration::seconds(DEFAULT_SESSION_TTL_SECS),
            max_active: DEFAULT_MAX_ACTIVE_SESSIONS,
        }
    }

    /// Create a SessionManager using the `[session]` configuration.
    pub fn from_config(db: &'a Database, cache: &'a dyn SessionCache, config: &SessionConfig) -> Self {
        Self::new(db, cache)
            .with_ttl(config.ttl())
            .with_max_active(config.max_active)
    }

    /// Set the session lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the per-user session cap.
    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    /// Get the per-user session cap.
    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Issue a session for a user.
    ///
    /// The per-user cap is enforced first. Fails with a transient error if
    /// the cache cannot be written.
    pub async fn create(
        &self,
        user_id: i64,
        root_dir_id: i64,
        auth_method: &str,
    ) -> Result<IssuedSession> {
        self.enforce_session_cap(user_id, self.max_active).await?;

        let session_id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let record = SessionRecord {
            user_id,
            root_dir_id,
            auth_method: auth_method.to_string(),
            created_at,
        };

        if let Err(e) = self.cache.set(&session_key(&session_id), &record, self.ttl).await {
            error!(user_id, error = %e, "Session cache unavailable; cannot create session");
            return Err(as_transient(e));
        }

        let expires_at = created_at + self.ttl;
        let entry = NewSessionIndexEntry {
            session_id: session_id.clone(),
            user_id,
            root_dir_id,
            auth_method: auth_method.to_string(),
            created_at,
            expires_at,
        };
        if let Err(e) = SessionIndexRepository::new(self.db.pool()).insert(&entry).await {
            warn!(user_id, error = %e, "Failed to index session");
        }

        info!(user_id, auth_method, "Session created");
        Ok(IssuedSession {
            session_id,
            ttl: self.ttl,
            expires_at,
        })
    }

    /// Look up a session.
    ///
    /// Returns `None` for unknown or expired sessions and whenever the cache
    /// cannot be reached.
    pub async fn validate(&self, session_id: &str) -> Option<SessionRecord> {
        if session_id.is_empty() {
            return None;
        }

        match self.cache.get(&session_key(session_id)).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Session cache unavailable; treating request as unauthenticated");
                None
            }
        }
    }

    /// Evict a user's oldest sessions so that one more fits under
    /// `max_active`. Returns the number of sessions evicted.
    pub async fn enforce_session_cap(&self, user_id: i64, max_active: usize) -> Result<usize> {
        if max_active == 0 {
            return Err(VaultError::Validation(
                "session cap must allow at least one session".to_string(),
            ));
        }

        let mut sessions = self.cache.find_by_user(user_id).await.map_err(|e| {
            error!(user_id, error = %e, "Session cache unavailable; cannot enforce cap");
            as_transient(e)
        })?;
        sessions.sort_by(|a, b| {
            a.record
                .created_at
                .cmp(&b.record.created_at)
                .then_with(|| a.key.cmp(&b.key))
        });

        let excess = (sessions.len() + 1).saturating_sub(max_active);
        for oldest in sessions.iter().take(excess) {
            self.revoke(oldest.session_id()).await?;
            info!(user_id, "Evicted oldest session to respect cap");
        }

        Ok(excess)
    }

    /// Revoke a session. Revoking an unknown session is not an error.
    pub async fn revoke(&self, session_id: &str) -> Result<()> {
        self.cache
            .delete(&session_key(session_id))
            .await
            .map_err(as_transient)?;

        if let Err(e) = SessionIndexRepository::new(self.db.pool()).delete(session_id).await {
            warn!(error = %e, "Failed to remove session from index");
        }

        debug!("Session revoked");
        Ok(())
    }

    /// Revoke every session of a user. Returns the number of distinct
    /// sessions revoked.
    pub async fn revoke_all(&self, user_id: i64) -> Result<usize> {
        let index = SessionIndexRepository::new(self.db.pool());

        let mut ids: BTreeSet<String> = self
            .cache
            .find_by_user(user_id)
            .await
            .map_err(as_transient)?
            .iter()
            .map(|s| s.session_id().to_string())
            .collect();
        match index.list_by_user(user_id).await {
            Ok(entries) => ids.extend(entries.into_iter().map(|e| e.session_id)),
            Err(e) => warn!(user_id, error = %e, "Failed to read session index"),
        }

        for id in &ids {
            self.cache
                .delete(&session_key(id))
                .await
                .map_err(as_transient)?;
        }
        if let Err(e) = index.delete_by_user(user_id).await {
            warn!(user_id, error = %e, "Failed to clear session index");
        }

        info!(user_id, revoked = ids.len(), "Revoked all sessions");
        Ok(ids.len())
    }

    /// Revoke every session of the user owning `session_id`.
    pub async fn logout_all(&self, session_id: &str) -> Result<usize> {
        let record = self
            .validate(session_id)
            .await
            .ok_or_else(|| VaultError::Auth("not authenticated".to_string()))?;
        self.revoke_all(record.user_id).await
    }

    /// List a user's sessions that are still valid in the cache.
    ///
    /// Index rows whose cache entry is gone are pruned.
    pub async fn list_active(&self, user_id: i64) -> Result<Vec<SessionIndexEntry>> {
        let index = SessionIndexRepository::new(self.db.pool());
        let mut active = Vec::new();

        for entry in index.list_by_user(user_id).await? {
            let live = self
                .cache
                .get(&session_key(&entry.session_id))
                .await
                .map_err(as_transient)?;
            if live.is_some() {
                active.push(entry);
            } else {
                debug!(user_id, "Pruning stale session index entry");
                index.delete(&entry.session_id).await?;
            }
        }

        Ok(active)
    }

    /// Drop index rows past their expiry. Returns the number removed.
    pub async fn prune_index(&self) -> Result<u64> {
        let removed = SessionIndexRepository::new(self.db.pool())
            .delete_expired(Utc::now())
            .await?;
        if removed > 0 {
            info!(removed, "Pruned expired session index entries");
        }
        Ok(removed)
    }
}

fn as_transient(e: VaultError) -> VaultError {
    match e {
        VaultError::TransientDependency(_) => e,
        other => VaultError::TransientDependency(format!("session cache: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::cache::{CachedSession, MemorySessionCache};
    use crate::db::{NewUser, UserRepository};
    use async_trait::async_trait;

    struct DownCache;

    #[async_trait]
    impl SessionCache for DownCache {
        async fn set(&self, _: &str, _: &SessionRecord, _: Duration) -> Result<()> {
            Err(VaultError::TransientDependency("connection refused".to_string()))
        }
        async fn get(&self, _: &str) -> Result<Option<SessionRecord>> {
            Err(VaultError::TransientDependency("connection refused".to_string()))
        }
        async fn delete(&self, _: &str) -> Result<bool> {
            Err(VaultError::TransientDependency("connection refused".to_string()))
        }
        async fn find_by_user(&self, _: i64) -> Result<Vec<CachedSession>> {
            Err(VaultError::TransientDependency("connection refused".to_string()))
        }
        async fn purge_expired(&self) -> Result<usize> {
            Err(VaultError::TransientDependency("connection refused".to_string()))
        }
    }

    async fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserRepository::new(db.pool())
            .create_with_root(&NewUser::new("Ann", "ann@example.com", 1000))
            .await
            .unwrap();
        let root = user.root_dir_id.unwrap();
        (db, user.id, root)
    }

    #[tokio::test]
    async fn test_create_and_validate() {
        let (db, user_id, root) = setup().await;
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache);

        let issued = sessions.create(user_id, root, "password").await.unwrap();
        assert_eq!(issued.ttl, Duration::days(7));

        let record = sessions.validate(&issued.session_id).await.unwrap();
        assert_eq!(record.user_id, user_id);
        assert_eq!(record.root_dir_id, root);
        assert!(sessions.validate("nope").await.is_none());
        assert!(sessions.validate("").await.is_none());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (db, user_id, root) = setup().await;
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache);

        let issued = sessions.create(user_id, root, "password").await.unwrap();
        sessions.revoke(&issued.session_id).await.unwrap();
        sessions.revoke(&issued.session_id).await.unwrap();
        assert!(sessions.validate(&issued.session_id).await.is_none());
        assert!(sessions.list_active(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cap_evicts_oldest() {
        let (db, user_id, root) = setup().await;
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache).with_max_active(2);

        let first = sessions.create(user_id, root, "password").await.unwrap();
        let second = sessions.create(user_id, root, "password").await.unwrap();
        let third = sessions.create(user_id, root, "google").await.unwrap();

        assert!(sessions.validate(&first.session_id).await.is_none());
        assert!(sessions.validate(&second.session_id).await.is_some());
        assert!(sessions.validate(&third.session_id).await.is_some());
        assert_eq!(cache.find_by_user(user_id).await.unwrap().len(), 2);
        assert_eq!(sessions.list_active(user_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_cap_rejected() {
        let (db, user_id, root) = setup().await;
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache).with_max_active(0);

        assert!(matches!(
            sessions.create(user_id, root, "password").await,
            Err(VaultError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_all_and_logout_all() {
        let (db, user_id, root) = setup().await;
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache).with_max_active(5);

        let a = sessions.create(user_id, root, "password").await.unwrap();
        let b = sessions.create(user_id, root, "password").await.unwrap();

        assert_eq!(sessions.logout_all(&a.session_id).await.unwrap(), 2);
        assert!(sessions.validate(&b.session_id).await.is_none());
        assert!(matches!(
            sessions.logout_all(&a.session_id).await,
            Err(VaultError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_list_active_prunes_stale_index_rows() {
        let (db, user_id, root) = setup().await;
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache);

        let issued = sessions.create(user_id, root, "password").await.unwrap();
        cache.delete(&session_key(&issued.session_id)).await.unwrap();

        assert!(sessions.list_active(user_id).await.unwrap().is_empty());
        let index = SessionIndexRepository::new(db.pool());
        assert!(index.get(&issued.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prune_index() {
        let (db, user_id, root) = setup().await;
        let cache = MemorySessionCache::new();
        let sessions = SessionManager::new(&db, &cache).with_ttl(Duration::seconds(-1));

        sessions.create(user_id, root, "password").await.unwrap();
        assert_eq!(sessions.prune_index().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_from_config_clamps_ttl() {
        let (db, user_id, root) = setup().await;
        let cache = MemorySessionCache::new();
        let config = SessionConfig {
            ttl_secs: u64::MAX,
            max_active: 2,
        };
        let sessions = SessionManager::from_config(&db, &cache, &config);

        let issued = sessions.create(user_id, root, "password").await.unwrap();
        assert_eq!(issued.ttl, Duration::seconds(crate::config::MAX_DURATION_SECS));
        assert!(sessions.validate(&issued.session_id).await.is_some());
        assert_eq!(sessions.prune_index().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cache_down() {
        let (db, user_id, root) = setup().await;
        let sessions = SessionManager::new(&db, &DownCache);

        let err = sessions.create(user_id, root, "password").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(sessions.validate("anything").await.is_none());

        let index = SessionIndexRepository::new(db.pool());
        assert!(index.list_by_user(user_id).await.unwrap().is_empty());
    }
}
