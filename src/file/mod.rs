//! File management module for skyvault.
//!
//! This module provides the directory-tree storage engine:
//! - Directory and file records with aggregate sizes
//! - Quota accounting along ancestor chains
//! - Two-phase uploads verified against the object store
//! - Subtree deletion
//! - Signed upload and download URLs

mod deletion;
mod directory;
mod metadata;
mod quota;
mod service;
mod signer;
mod storage;
mod upload;

pub use deletion::{DeletionEngine, DeletionReport};
pub use directory::{Directory, DirectoryRepository, NewDirectory};
pub use metadata::{extension_of, FileKey, FileRecord, FileRepository, NewFile};
pub use quota::{QuotaLedger, SizeDiscrepancy};
pub use service::{DirectoryListing, DirectoryService, DEFAULT_DOWNLOAD_TTL_SECS};
pub use signer::{content_disposition, CdnSigner, Disposition, DownloadSigner, UrlSigner};
pub use storage::{
    object_key, LocalObjectStore, ObjectDeleteFailure, ObjectMeta, ObjectStore, UploadHandle,
};
pub use upload::{InitiatedUpload, UploadCoordinator, UploadRequest};

use crate::{Result, VaultError};

/// Maximum length for file and folder names (in characters).
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Name given to folders created without one.
pub const DEFAULT_DIRECTORY_NAME: &str = "New Folder";

/// Name given to uploads started without one.
pub const DEFAULT_FILE_NAME: &str = "untitled";

/// Validate a file or folder name.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(VaultError::Validation("name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_FILENAME_LENGTH {
        return Err(VaultError::Validation(format!(
            "name must be at most {MAX_FILENAME_LENGTH} characters"
        )));
    }
    if name.contains(['/', '\\']) || name.chars().any(char::is_control) {
        return Err(VaultError::Validation(
            "name contains invalid characters".to_string(),
        ));
    }
    if name == "." || name == ".." {
        return Err(VaultError::Validation("name is reserved".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("report.pdf").is_ok());
        assert!(validate_name("New Folder").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("tab\there").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name(&"x".repeat(MAX_FILENAME_LENGTH)).is_ok());
        assert!(validate_name(&"x".repeat(MAX_FILENAME_LENGTH + 1)).is_err());
    }
}
