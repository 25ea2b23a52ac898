//! Authentication module for skyvault.
//!
//! This module provides identity resolution, email verification codes,
//! password hashing, role checks and cache-backed session management.

mod cache;
mod identity;
mod otp;
mod password;
pub mod permission;
mod session;
pub mod validation;

pub use cache::{session_key, CachedSession, MemorySessionCache, SessionCache, SessionRecord};
pub use identity::{IdentityProfile, IdentityResolver, LoginOutcome, PASSWORD_AUTH_METHOD};
pub use otp::{IssuedCode, OtpService, OTP_DIGITS, OTP_TTL_MINUTES};
pub use password::{hash_password, validate_password, verify_password, PasswordError};
pub use permission::{check_permission, require_admin, require_manager, PermissionError};
pub use session::{
    IssuedSession, SessionManager, DEFAULT_MAX_ACTIVE_SESSIONS, DEFAULT_SESSION_TTL_SECS,
};
pub use validation::ValidationError;
