//! Error types for skyvault.

use thiserror::Error;

/// Stable error category surfaced to callers.
///
/// The routing layer decides from this whether to retry, ask the client to
/// fix its input, or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Resource absent or not owned by the caller.
    NotFound,
    /// Quota exceeded.
    InsufficientStorage,
    /// Declared and stored upload size differ.
    SizeMismatch,
    /// A dependency (object store, cache) is unreachable.
    Transient,
    /// Stored aggregate sizes no longer match reality.
    Consistency,
    /// Malformed input.
    Validation,
    /// Not authenticated or bad credentials.
    Unauthorized,
    /// Authenticated but not allowed.
    Forbidden,
    /// Anything else.
    Internal,
}

/// Common error type for skyvault.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Database error.
    ///
    /// Errors from sqlx are converted into this variant.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found (or not owned by the caller).
    #[error("{0} not found")]
    NotFound(String),

    /// The candidate file does not fit in the remaining quota.
    #[error("insufficient storage: requested {requested} bytes, {remaining} bytes remaining")]
    InsufficientStorage {
        /// Requested size in bytes.
        requested: i64,
        /// Remaining space in bytes at check time.
        remaining: i64,
    },

    /// The object store reported a different size than was declared.
    ///
    /// `actual` is `None` when the object is missing entirely.
    #[error("upload size mismatch: declared {declared} bytes, stored {}", fmt_actual(.actual))]
    SizeMismatch {
        /// Size declared at initiate time.
        declared: i64,
        /// Size reported by the object store.
        actual: Option<i64>,
    },

    /// An external dependency could not be reached.
    #[error("dependency unavailable: {0}")]
    TransientDependency(String),

    /// Ancestor-chain size propagation stopped partway.
    ///
    /// Every directory below `failed_dir_id` on the chain already carries the
    /// delta; the rest does not.
    #[error(
        "size propagation of {delta} from directory {start_dir_id} stopped at {failed_dir_id} \
         after {applied} update(s): {reason}"
    )]
    ConsistencyFault {
        /// Directory the walk started from.
        start_dir_id: i64,
        /// Directory whose update failed.
        failed_dir_id: i64,
        /// Number of directories already updated.
        applied: usize,
        /// Delta being applied.
        delta: i64,
        /// What went wrong.
        reason: String,
    },

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The account has been soft-deleted.
    #[error("account has been deleted")]
    AccountDeleted,

    /// Permission denied error.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

fn fmt_actual(actual: &Option<i64>) -> String {
    match actual {
        Some(size) => format!("{size} bytes"),
        None => "no object".to_string(),
    }
}

impl VaultError {
    /// Get the stable category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            VaultError::NotFound(_) => ErrorCategory::NotFound,
            VaultError::InsufficientStorage { .. } => ErrorCategory::InsufficientStorage,
            VaultError::SizeMismatch { .. } => ErrorCategory::SizeMismatch,
            VaultError::TransientDependency(_) => ErrorCategory::Transient,
            VaultError::ConsistencyFault { .. } => ErrorCategory::Consistency,
            VaultError::Validation(_) => ErrorCategory::Validation,
            VaultError::Auth(_) => ErrorCategory::Unauthorized,
            VaultError::AccountDeleted | VaultError::Permission(_) => ErrorCategory::Forbidden,
            VaultError::Database(_)
            | VaultError::Io(_)
            | VaultError::Config(_)
            | VaultError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::TransientDependency(_))
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for VaultError {
    fn from(e: sqlx::Error) -> Self {
        VaultError::Database(e.to_string())
    }
}

/// Result type alias for skyvault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
