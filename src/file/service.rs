//! Directory service for skyvault.
//!
//! This module provides the non-destructive tree operations:
//! - Folder creation and listing
//! - Renaming folders and files
//! - Signed download links for confirmed files

use chrono::Duration;
use tracing::{debug, info};

use super::directory::{Directory, DirectoryRepository, NewDirectory};
use super::metadata::{FileRecord, FileRepository};
use super::signer::{Disposition, DownloadSigner};
use super::{validate_name, DEFAULT_DIRECTORY_NAME};
use crate::{Database, Result, VaultError};

/// Default lifetime of a download link (24 hours).
pub const DEFAULT_DOWNLOAD_TTL_SECS: i64 = 24 * 60 * 60;

/// A directory together with its direct children.
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    /// The directory itself.
    pub directory: Directory,
    /// Child directories.
    pub directories: Vec<Directory>,
    /// Confirmed child files.
    pub files: Vec<FileRecord>,
}

/// Service for browsing and organizing a user's tree.
pub struct DirectoryService<'a> {
    db: &'a Database,
    signer: &'a dyn DownloadSigner,
    download_ttl: Duration,
}

impl<'a> DirectoryService<'a> {
    /// Create a new DirectoryService.
    pub fn new(db: &'a Database, signer: &'a dyn DownloadSigner) -> Self {
        Self {
            db,
            signer,
            download_ttl: Duration::seconds(DEFAULT_DOWNLOAD_TTL_SECS),
        }
    }

    /// Set a custom download link lifetime.
    pub fn with_download_ttl(mut self, ttl: Duration) -> Self {
        self.download_ttl = ttl;
        self
    }

    /// Create a folder.
    ///
    /// The parent defaults to the user's root and the name to `New Folder`.
    pub async fn create_directory(
        &self,
        user_id: i64,
        parent_dir_id: Option<i64>,
        name: Option<&str>,
    ) -> Result<Directory> {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_DIRECTORY_NAME);
        validate_name(name)?;

        let parent = self.owned_directory(user_id, parent_dir_id).await?;
        let dir = DirectoryRepository::new(self.db.pool())
            .create(&NewDirectory::new(name, parent.id, user_id))
            .await?;

        info!(user_id, dir_id = dir.id, parent_id = parent.id, "Created directory");
        Ok(dir)
    }

    /// Get a directory with its child folders and confirmed files.
    pub async fn get_directory(&self, user_id: i64, dir_id: Option<i64>) -> Result<DirectoryListing> {
        let directory = self.owned_directory(user_id, dir_id).await?;
        let directories = DirectoryRepository::new(self.db.pool())
            .list_children(directory.id)
            .await?;
        let files = FileRepository::new(self.db.pool())
            .list_confirmed_by_parent(directory.id)
            .await?;

        Ok(DirectoryListing {
            directory,
            directories,
            files,
        })
    }

    /// Rename a folder.
    pub async fn rename_directory(&self, user_id: i64, dir_id: i64, name: &str) -> Result<Directory> {
        let name = name.trim();
        validate_name(name)?;

        let repo = DirectoryRepository::new(self.db.pool());
        repo.get_owned(dir_id, user_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))?;

        let dir = repo
            .rename(dir_id, name)
            .await?
            .ok_or_else(|| VaultError::NotFound("directory".to_string()))?;
        debug!(user_id, dir_id, "Renamed directory");
        Ok(dir)
    }

    /// Rename a file. The stored extension, and so the object key, is kept.
    pub async fn rename_file(&self, user_id: i64, file_id: i64, name: &str) -> Result<FileRecord> {
        let name = name.trim();
        validate_name(name)?;

        let repo = FileRepository::new(self.db.pool());
        repo.get_owned(file_id, user_id)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;

        let file = repo
            .rename(file_id, name)
            .await?
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;
        debug!(user_id, file_id, "Renamed file");
        Ok(file)
    }

    /// Signed download link for a confirmed file.
    pub async fn file_url(
        &self,
        user_id: i64,
        file_id: i64,
        disposition: Disposition,
    ) -> Result<String> {
        let file = FileRepository::new(self.db.pool())
            .get_owned(file_id, user_id)
            .await?
            .filter(|f| !f.is_uploading)
            .ok_or_else(|| VaultError::NotFound("file".to_string()))?;

        self.signer
            .signed_get_url(&file.object_key(), disposition, &file.name, self.download_ttl)
    }

    async fn owned_directory(&self, user_id: i64, dir_id: Option<i64>) -> Result<Directory> {
        let repo = DirectoryRepository::new(self.db.pool());
        let dir = match dir_id {
            Some(id) => repo.get_owned(id, user_id).await?,
            None => repo.get_root(user_id).await?,
        };
        dir.ok_or_else(|| VaultError::NotFound("directory".to_string()))
    }
}
