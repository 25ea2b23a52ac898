//! Object storage for skyvault.
//!
//! The core only talks to object storage through [`ObjectStore`]. The
//! bundled [`LocalObjectStore`] keeps objects on disk in a sharded layout:
//!
//! ```text
//! {base_path}/
//! ├── 12/
//! │   └── 12.txt
//! ├── 13/
//! │   └── 134.pdf
//! └── ...
//! ```
//!
//! and hands out signed, time-limited upload URLs that the receiving side
//! redeems through [`LocalObjectStore::accept_upload`].

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use super::signer::UrlSigner;
use crate::{Result, VaultError};

/// Metadata reported for a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Stored size in bytes.
    pub size: i64,
}

/// Time-limited, single-use upload handle.
#[derive(Debug, Clone)]
pub struct UploadHandle {
    /// URL the client uploads the bytes to.
    pub url: String,
    /// When the handle stops being accepted.
    pub expires_at: DateTime<Utc>,
}

/// A key the store failed to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDeleteFailure {
    /// Object key.
    pub key: String,
    /// Reason reported by the store.
    pub reason: String,
}

/// Object storage capability.
///
/// Implementations report unreachable-store conditions as
/// [`VaultError::TransientDependency`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Issue an upload handle for `key`.
    async fn put_object_handle(&self, key: &str, content_type: &str) -> Result<UploadHandle>;

    /// Fetch object metadata, or `None` when no such object exists.
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// Delete a single object. Deleting a missing object is not an error.
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Delete many objects in one request, returning the keys that failed.
    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<ObjectDeleteFailure>>;
}

/// Storage object key for a file: `<fileId><extension>`.
pub fn object_key(file_id: i64, extension: &str) -> String {
    format!("{file_id}{extension}")
}

/// Filesystem-backed object store.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    /// Base directory for object storage.
    base_path: PathBuf,
    /// Base URL upload handles point at.
    public_base_url: String,
    signer: UrlSigner,
    upload_ttl: Duration,
}

impl LocalObjectStore {
    /// Create a new LocalObjectStore with the given base path.
    ///
    /// The base directory will be created if it doesn't exist.
    pub fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        signer: UrlSigner,
        upload_ttl: Duration,
    ) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;

        Ok(Self {
            base_path,
            public_base_url: public_base_url.into(),
            signer,
            upload_ttl,
        })
    }

    /// Get the base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Store the bytes for a previously issued upload handle.
    ///
    /// Returns the key written. Expired or forged handles are rejected with
    /// an authentication error; a handle is spent once its object exists.
    pub async fn accept_upload(&self, handle_url: &str, content: &[u8]) -> Result<String> {
        let url = Url::parse(handle_url)
            .map_err(|e| VaultError::Validation(format!("invalid upload url: {e}")))?;
        let key = self.signer.verify(&url, Utc::now())?;
        validate_key(&key)?;

        let path = self.object_path(&key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(VaultError::Auth("upload handle already used".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let written = async {
            file.write_all(content).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path).await {
                warn!(key = %key, error = %cleanup, "Failed to remove partial upload");
            }
            return Err(e.into());
        }

        debug!(key = %key, bytes = content.len(), "Stored object");
        Ok(key)
    }

    /// Get the full path for an object key.
    ///
    /// The path is constructed as: {base_path}/{shard}/{key}
    /// where shard is the first 2 characters of the key.
    pub fn object_path(&self, key: &str) -> PathBuf {
        self.base_path.join(Self::shard(key)).join(key)
    }

    fn shard(key: &str) -> &str {
        match key.char_indices().nth(2) {
            Some((idx, _)) => &key[..idx],
            None => key,
        }
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
        return Err(VaultError::Validation(format!("invalid object key: {key}")));
    }
    Ok(())
}

fn transient(key: &str, e: io::Error) -> VaultError {
    VaultError::TransientDependency(format!("object store error for {key}: {e}"))
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_object_handle(&self, key: &str, content_type: &str) -> Result<UploadHandle> {
        validate_key(key)?;
        let expires_at = Utc::now() + self.upload_ttl;
        let url = self.signer.sign(
            &self.public_base_url,
            key,
            &[("content-type", content_type)],
            expires_at,
        )?;

        Ok(UploadHandle {
            url: url.to_string(),
            expires_at,
        })
    }

    async fn head_object(&self, key: &str) -> Result<Option<ObjectMeta>> {
        validate_key(key)?;
        match fs::metadata(self.object_path(key)).await {
            Ok(m) => Ok(Some(ObjectMeta {
                size: m.len() as i64,
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(transient(key, e)),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        match fs::remove_file(self.object_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(transient(key, e)),
        }
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<Vec<ObjectDeleteFailure>> {
        let results = join_all(keys.iter().map(|key| self.delete_object(key))).await;

        let failures = keys
            .iter()
            .zip(results)
            .filter_map(|(key, result)| {
                result.err().map(|e| {
                    warn!(key = %key, error = %e, "Failed to delete object");
                    ObjectDeleteFailure {
                        key: key.clone(),
                        reason: e.to_string(),
                    }
                })
            })
            .collect();
        Ok(failures)
    }
}
