//! Test helpers for integration tests.
//!
//! Provides an in-memory object store with scriptable failures and a
//! pausable batch delete, a session cache that is always down, and seeding
//! helpers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Notify;

use skyvault::auth::{CachedSession, SessionCache, SessionRecord};
use skyvault::db::{NewUser, User, UserRepository};
use skyvault::file::{ObjectDeleteFailure, ObjectMeta, ObjectStore, UploadHandle};
use skyvault::{Database, FileRecord, Result, UploadCoordinator, UploadRequest, VaultError};

/// Object store backed by a map of key to size.
#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<String, i64>>,
    unreachable: AtomicBool,
    undeletable: Mutex<HashSet<String>>,
    hold_batch_delete: AtomicBool,
    batch_delete_started: Notify,
    batch_delete_released: Notify,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the client uploaded `size` bytes under `key`.
    pub fn put(&self, key: &str, size: i64) {
        self.objects.lock().unwrap().insert(key.to_string(), size);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Make every call fail as if the store could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Make deletes of `key` fail.
    pub fn fail_delete(&self, key: &str) {
        self.undeletable.lock().unwrap().insert(key.to_string());
    }

    /// Make the next `delete_objects` call wait for
    /// [`release_batch_delete`](Self::release_batch_delete) before touching
    /// any object.
    pub fn hold_next_batch_delete(&self) {
        self.hold_batch_delete.store(true, Ordering::SeqCst);
    }

    /// Wait until a held `delete_objects` call has started.
    pub async fn batch_delete_started(&self) {
        self.batch_delete_started.notified().await;
    }

    pub fn release_batch_delete(&self) {
        self.batch_delete_released.notify_one();
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(VaultError::TransientDependency(
                "object store unreachable".to_string(),
            ));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> std::result::Result<(), String> {
        if self.undeletable.lock().unwrap().contains(key) {
            return Err("access denied".to_string());
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put_object_handle(&self, key: &str, _content_type: &str) -> Result<UploadHandle> {
        self.check_reachable()?;
        Ok(UploadHandle {
            url: format!("https://objects.test/{key}"),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>> {
        self.check_reachable()?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .map(|&size| ObjectMeta { size }))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.check_reachable()?;
        self.remove(key).map_err(VaultError::TransientDependency)
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<ObjectDeleteFailure>> {
        if self.hold_batch_delete.swap(false, Ordering::SeqCst) {
            self.batch_delete_started.notify_one();
            self.batch_delete_released.notified().await;
        }
        self.check_reachable()?;
        Ok(keys
            .iter()
            .filter_map(|key| {
                self.remove(key).err().map(|reason| ObjectDeleteFailure {
                    key: key.clone(),
                    reason,
                })
            })
            .collect())
    }
}

/// Session cache that cannot be reached.
pub struct FailingSessionCache;

fn cache_down<T>() -> Result<T> {
    Err(VaultError::TransientDependency(
        "session cache unreachable".to_string(),
    ))
}

#[async_trait]
impl SessionCache for FailingSessionCache {
    async fn set(&self, _key: &str, _record: &SessionRecord, _ttl: Duration) -> Result<()> {
        cache_down()
    }

    async fn get(&self, _key: &str) -> Result<Option<SessionRecord>> {
        cache_down()
    }

    async fn delete(&self, _key: &str) -> Result<bool> {
        cache_down()
    }

    async fn find_by_user(&self, _user_id: i64) -> Result<Vec<CachedSession>> {
        cache_down()
    }

    async fn purge_expired(&self) -> Result<usize> {
        cache_down()
    }
}

/// Open a fresh in-memory database.
pub async fn setup_db() -> Database {
    Database::open_in_memory().await.unwrap()
}

/// Create a user with a root directory and the given quota.
pub async fn create_user(db: &Database, email: &str, max_storage_bytes: i64) -> User {
    UserRepository::new(db.pool())
        .create_with_root(&NewUser::new("Test User", email, max_storage_bytes))
        .await
        .unwrap()
}

/// Root directory ID of a user.
pub fn root_of(user: &User) -> i64 {
    user.root_dir_id.unwrap()
}

/// Run initiate, simulate the client upload, then complete.
pub async fn upload(
    coordinator: &UploadCoordinator<'_>,
    store: &FakeObjectStore,
    user: &User,
    parent_dir_id: i64,
    name: &str,
    size: i64,
) -> Result<FileRecord> {
    let initiated = coordinator
        .initiate(
            user.id,
            UploadRequest::new(size)
                .with_parent(parent_dir_id)
                .with_name(name),
        )
        .await?;
    store.put(&initiated.object_key, size);
    coordinator.complete(user.id, initiated.file_id).await
}
