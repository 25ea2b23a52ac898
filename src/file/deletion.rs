//! Subtree and single-file deletion.
//!
//! Object-store failures never block record deletion: once the records are
//! gone the objects they pointed at are unreachable, so leftover objects are
//! logged as orphans for out-of-band cleanup.

use std::collections::{HashSet, VecDeque};

use sqlx::SqliteConnection;
use tracing::{info, warn};

use super::directory::DirectoryRepository;
use super::metadata::{delete_by_ids, FileRecord, FileRepository};
use super::quota::QuotaLedger;
use super::storage::ObjectStore;
use crate::{Database, Result, VaultError};

/// Outcome of a subtree deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    /// File records removed.
    pub files_removed: u64,
    /// Directory records removed, including the subtree root.
    pub directories_removed: u64,
    /// Bytes released from the ancestors' aggregate size.
    pub bytes_released: i64,
    /// Object keys the store failed to delete.
    pub orphaned_objects: Vec<String>,
}

/// Engine for destructive tree operations.
pub struct DeletionEngine<'a> {
    db: &'a Database,
    store: &'a dyn ObjectStore,
}

impl<'a> DeletionEngine<'a> {
    /// Create a new DeletionEngine.
    pub fn new(db: &'a Database, store: &'a dyn ObjectStore) -> Self {
        Self { db, store }
    }

    /// Delete `directory_id` and everything beneath it.
    ///
    /// Objects are removed first, outside any transaction. The records are
    /// then listed again and removed in one transaction, so directories or
    /// uploads created inside the subtree in the meantime go with it. The
    /// size released from the ancestors is the directory's size as read
    /// inside that transaction.
    pub async fn delete_subtree(&self, directory_id: i64, owner_id: i64) -> Result<DeletionReport> {
        let dirs = DirectoryRepository::new(self.db.pool());
        let target = dirs
            .get_owned(directory_id, owner_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))?;
        let parent_id = target
            .parent_id
            .ok_or_else(|| VaultError::Validation("cannot delete a root directory".to_string()))?;

        let scanned = {
            let mut conn = self.db.pool().acquire().await?;
            Subtree::scan(&mut *conn, target.id).await?
        };
        let mut orphaned_objects = self.delete_objects(&scanned.keys).await;

        let mut tx = self.db.begin().await?;
        let bytes_released = DirectoryRepository::fetch_size(&mut *tx, target.id)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))?;
        let mut subtree = Subtree::scan(&mut *tx, target.id).await?;
        // Deepest directories first so no parent outlives a child.
        subtree.dir_ids.reverse();
        let files_removed = FileRepository::delete_many(&mut *tx, &subtree.file_ids).await?;
        let directories_removed = delete_by_ids(&mut *tx, "directories", &subtree.dir_ids).await?;
        tx.commit().await?;

        if bytes_released != 0 {
            QuotaLedger::new(self.db)
                .propagate_size_delta(parent_id, -bytes_released)
                .await?;
        }

        let already_deleted: HashSet<&String> = scanned.keys.iter().collect();
        let late_keys: Vec<String> = subtree
            .keys
            .iter()
            .filter(|key| !already_deleted.contains(key))
            .cloned()
            .collect();
        if !late_keys.is_empty() {
            info!(
                directory_id,
                count = late_keys.len(),
                "Deleting objects created during subtree deletion"
            );
            orphaned_objects.extend(self.delete_objects(&late_keys).await);
        }

        info!(
            directory_id,
            owner_id,
            files_removed,
            directories_removed,
            bytes_released,
            orphaned = orphaned_objects.len(),
            "Deleted directory subtree"
        );

        Ok(DeletionReport {
            files_removed,
            directories_removed,
            bytes_released,
            orphaned_objects,
        })
    }

    /// Delete a single file.
    ///
    /// Confirmed files release their size from every ancestor; uploading
    /// files were never charged.
    pub async fn delete_file(&self, file_id: i64, owner_id: i64) -> Result<FileRecord> {
        let files = FileRepository::new(self.db.pool());
        let file = files
            .get_owned(file_id, owner_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;

        let key = file.object_key();
        if let Err(e) = self.store.delete_object(&key).await {
            warn!(key = %key, error = %e, "Failed to delete object; leaving it orphaned");
        }

        let (was_uploading, size) = files
            .delete(file_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;

        if !was_uploading && size != 0 {
            QuotaLedger::new(self.db)
                .propagate_size_delta(file.parent_id, -size)
                .await?;
        }

        info!(file_id, owner_id, size, "Deleted file");
        Ok(FileRecord {
            is_uploading: was_uploading,
            size,
            ..file
        })
    }

    async fn delete_objects(&self, keys: &[String]) -> Vec<String> {
        if keys.is_empty() {
            return Vec::new();
        }
        match self.store.delete_objects(keys).await {
            Ok(failures) if failures.is_empty() => Vec::new(),
            Ok(failures) => {
                let orphaned: Vec<String> = failures.into_iter().map(|f| f.key).collect();
                warn!(count = orphaned.len(), keys = ?orphaned, "Objects left orphaned after batch delete");
                orphaned
            }
            Err(e) => {
                warn!(count = keys.len(), keys = ?keys, error = %e, "Batch object delete failed");
                keys.to_vec()
            }
        }
    }
}

/// Records found beneath a directory, listed breadth-first.
#[derive(Debug, Default)]
struct Subtree {
    dir_ids: Vec<i64>,
    file_ids: Vec<i64>,
    keys: Vec<String>,
}

impl Subtree {
    async fn scan(conn: &mut SqliteConnection, root_id: i64) -> Result<Self> {
        let mut subtree = Self::default();
        let mut queue = VecDeque::from([root_id]);
        while let Some(dir_id) = queue.pop_front() {
            subtree.dir_ids.push(dir_id);
            for file in FileRepository::fetch_keys_by_parent(&mut *conn, dir_id).await? {
                subtree.keys.push(file.object_key());
                subtree.file_ids.push(file.id);
            }
            queue.extend(DirectoryRepository::fetch_child_ids(&mut *conn, dir_id).await?);
        }
        Ok(subtree)
    }
}
