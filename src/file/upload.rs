//! Two-phase upload protocol.
//!
//! `initiate` allocates a file record in the uploading state and hands out
//! an upload handle; nothing is charged to the quota yet. `complete` checks
//! the stored object against the declared size and only then confirms the
//! record and charges its ancestors. Any failure during `complete` removes
//! the allocation, so no record is left uploading with charged quota.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::directory::{Directory, DirectoryRepository};
use super::metadata::{FileRecord, FileRepository, NewFile};
use super::quota::QuotaLedger;
use super::storage::ObjectStore;
use super::{validate_name, DEFAULT_FILE_NAME};
use crate::{Database, Result, VaultError};

/// Parameters for starting an upload.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// Target directory; the caller's root when absent.
    pub parent_dir_id: Option<i64>,
    /// File name; `untitled` when absent.
    pub name: Option<String>,
    /// Size the client promises to upload.
    pub declared_size: i64,
    /// MIME type; guessed from the name when absent.
    pub content_type: Option<String>,
}

impl UploadRequest {
    /// Create a request for `declared_size` bytes.
    pub fn new(declared_size: i64) -> Self {
        Self {
            declared_size,
            ..Default::default()
        }
    }

    /// Set the target directory.
    pub fn with_parent(mut self, parent_dir_id: i64) -> Self {
        self.parent_dir_id = Some(parent_dir_id);
        self
    }

    /// Set the file name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Result of a successful initiate.
#[derive(Debug, Clone)]
pub struct InitiatedUpload {
    /// Allocated file ID.
    pub file_id: i64,
    /// Object key the bytes must land under.
    pub object_key: String,
    /// Time-limited upload URL.
    pub upload_url: String,
    /// When the upload URL stops being accepted.
    pub expires_at: DateTime<Utc>,
}

/// Coordinator for the initiate/complete upload protocol.
pub struct UploadCoordinator<'a> {
    db: &'a Database,
    store: &'a dyn ObjectStore,
}

impl<'a> UploadCoordinator<'a> {
    /// Create a new UploadCoordinator.
    pub fn new(db: &'a Database, store: &'a dyn ObjectStore) -> Self {
        Self { db, store }
    }

    /// Allocate a file record and obtain an upload handle.
    ///
    /// Fails with `InsufficientStorage` before anything is written when the
    /// declared size does not fit.
    pub async fn initiate(&self, user_id: i64, request: UploadRequest) -> Result<InitiatedUpload> {
        if request.declared_size < 0 {
            return Err(VaultError::Validation("file size cannot be negative".to_string()));
        }
        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string();
        validate_name(&name)?;

        let parent = self.resolve_parent(user_id, request.parent_dir_id).await?;
        QuotaLedger::new(self.db)
            .ensure_capacity(user_id, request.declared_size)
            .await?;

        let content_type = request.content_type.unwrap_or_else(|| {
            mime_guess::from_path(&name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        });

        let files = FileRepository::new(self.db.pool());
        let file = files
            .create(
                &NewFile::new(name, parent.id, user_id, request.declared_size)
                    .with_content_type(content_type),
            )
            .await?;
        let object_key = file.object_key();

        let handle = match self.store.put_object_handle(&object_key, &file.content_type).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(file_id = file.id, error = %e, "Could not obtain upload handle");
                files.delete_uploading(file.id).await?;
                return Err(as_transient(e));
            }
        };

        info!(
            user_id,
            file_id = file.id,
            parent_id = parent.id,
            declared_size = file.size,
            "Upload initiated"
        );

        Ok(InitiatedUpload {
            file_id: file.id,
            object_key,
            upload_url: handle.url,
            expires_at: handle.expires_at,
        })
    }

    /// Verify the stored object and confirm the upload.
    ///
    /// On success the file's size is charged to its parent and every
    /// ancestor exactly once.
    pub async fn complete(&self, user_id: i64, file_id: i64) -> Result<FileRecord> {
        let files = FileRepository::new(self.db.pool());
        let file = files
            .get_owned(file_id, user_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;
        if !file.is_uploading {
            return Err(VaultError::Validation("upload already completed".to_string()));
        }

        let key = file.object_key();
        let actual = match self.store.head_object(&key).await {
            Ok(meta) => meta.map(|m| m.size),
            Err(e) => {
                warn!(file_id, error = %e, "Could not verify upload; discarding allocation");
                files.delete_uploading(file_id).await?;
                return Err(as_transient(e));
            }
        };

        if actual != Some(file.size) {
            warn!(
                file_id,
                declared = file.size,
                actual = ?actual,
                "Upload size mismatch; discarding allocation"
            );
            files.delete_uploading(file_id).await?;
            if actual.is_some() {
                if let Err(e) = self.store.delete_object(&key).await {
                    warn!(key = %key, error = %e, "Failed to delete mismatched object");
                }
            }
            return Err(VaultError::SizeMismatch {
                declared: file.size,
                actual,
            });
        }

        if !files.confirm(file_id).await? {
            return match files.get_by_id(file_id).await? {
                Some(f) if !f.is_uploading => {
                    Err(VaultError::Validation("upload already completed".to_string()))
                }
                _ => Err(VaultError::NotFound("file".to_string())),
            };
        }

        QuotaLedger::new(self.db)
            .propagate_size_delta(file.parent_id, file.size)
            .await?;

        info!(user_id, file_id, size = file.size, "Upload completed");
        Ok(FileRecord {
            is_uploading: false,
            ..file
        })
    }

    /// Discard an allocation the client no longer intends to finish.
    pub async fn abort(&self, user_id: i64, file_id: i64) -> Result<()> {
        let files = FileRepository::new(self.db.pool());
        let file = files
            .get_owned(file_id, user_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;
        if !file.is_uploading {
            return Err(VaultError::Validation("upload already completed".to_string()));
        }

        if !files.delete_uploading(file_id).await? {
            return Err(VaultError::NotFound("file".to_string()));
        }
        self.discard_object(&file.object_key()).await;

        info!(user_id, file_id, "Upload aborted");
        Ok(())
    }

    /// Remove allocations that have been uploading for longer than
    /// `older_than`. Returns the number of allocations discarded.
    pub async fn discard_stale(&self, older_than: Duration) -> Result<usize> {
        let files = FileRepository::new(self.db.pool());
        let stale = files.list_stale_uploading(Utc::now() - older_than).await?;

        let mut discarded = 0;
        for file in stale {
            if files.delete_uploading(file.id).await? {
                self.discard_object(&file.object_key()).await;
                discarded += 1;
            }
        }

        if discarded > 0 {
            info!(discarded, "Discarded stale uploads");
        }
        Ok(discarded)
    }

    async fn resolve_parent(&self, user_id: i64, parent_dir_id: Option<i64>) -> Result<Directory> {
        let dirs = DirectoryRepository::new(self.db.pool());
        let parent = match parent_dir_id {
            Some(id) => dirs.get_owned(id, user_id).await?,
            None => dirs.get_root(user_id).await?,
        };
        parent.ok_or_else(|| VaultError::NotFound("directory".to_string()))
    }

    async fn discard_object(&self, key: &str) {
        if let Err(e) = self.store.delete_object(key).await {
            warn!(key = %key, error = %e, "Failed to delete object");
        } else {
            debug!(key = %key, "Deleted object");
        }
    }
}

fn as_transient(e: VaultError) -> VaultError {
    match e {
        VaultError::TransientDependency(_) => e,
        other => VaultError::TransientDependency(other.to_string()),
    }
}
