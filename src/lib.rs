//! skyvault - multi-tenant hierarchical file storage core
//!
//! Quota accounting over per-user directory trees, a two-phase upload
//! protocol against an external object store, subtree deletion and
//! cache-backed session lifecycle.

pub mod admin;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod file;
pub mod logging;
pub mod maintenance;

pub use admin::{UserAdminService, UserListEntry, UserSummary};
pub use auth::{
    check_permission, hash_password, require_admin, require_manager, validate_password,
    verify_password, CachedSession, IdentityProfile, IdentityResolver, IssuedCode,
    IssuedSession, LoginOutcome, MemorySessionCache, OtpService, PasswordError,
    PermissionError, SessionCache, SessionManager, SessionRecord, ValidationError,
};
pub use config::Config;
pub use db::{Database, NewUser, Role, User, UserRepository, UserUpdate};
pub use error::{ErrorCategory, Result, VaultError};
pub use maintenance::MaintenanceReport;
pub use file::{
    DeletionEngine, DeletionReport, Directory, DirectoryListing, DirectoryRepository,
    DirectoryService, FileRecord, FileRepository, LocalObjectStore, ObjectStore, QuotaLedger,
    UploadCoordinator, UploadRequest,
};
