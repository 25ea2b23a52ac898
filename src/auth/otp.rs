//! Email verification codes.
//!
//! Codes are numeric, valid for [`OTP_TTL_MINUTES`] and spent on first use.
//! Delivering the code to the user's inbox is the caller's job.

use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use tracing::{debug, info};

use super::validation::validate_email;
use crate::db::OneTimeCodeRepository;
use crate::{Database, Result, VaultError};

/// Number of digits in a verification code.
pub const OTP_DIGITS: usize = 6;

/// Minutes a verification code stays valid.
pub const OTP_TTL_MINUTES: i64 = 10;

/// A freshly issued code, to be delivered to `email`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    /// Recipient address.
    pub email: String,
    /// The code.
    pub code: String,
    /// When the code stops being accepted.
    pub expires_at: DateTime<Utc>,
}

fn generate_code() -> String {
    let code = OsRng.next_u32() % 10u32.pow(OTP_DIGITS as u32);
    format!("{code:0width$}", width = OTP_DIGITS)
}

/// Issues and checks verification codes.
pub struct OtpService<'a> {
    db: &'a Database,
    ttl: Duration,
}

impl<'a> OtpService<'a> {
    /// Create a new OtpService with the default code lifetime.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            ttl: Duration::minutes(OTP_TTL_MINUTES),
        }
    }

    /// Set the code lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Issue a code for `email`, replacing any outstanding one.
    pub async fn issue(&self, email: &str) -> Result<IssuedCode> {
        validate_email(email)?;
        let now = Utc::now();
        let stored = OneTimeCodeRepository::new(self.db.pool())
            .upsert(email, &generate_code(), now, now + self.ttl)
            .await?;

        info!(expires_at = %stored.expires_at, "Issued verification code");
        Ok(IssuedCode {
            email: email.to_string(),
            code: stored.code,
            expires_at: stored.expires_at,
        })
    }

    /// Check a code without spending it.
    pub async fn verify(&self, email: &str, code: &str) -> Result<bool> {
        OneTimeCodeRepository::new(self.db.pool())
            .matches(email, code.trim(), Utc::now())
            .await
    }

    /// Spend a code, failing with a validation error if it is wrong,
    /// expired or already used.
    pub async fn consume(&self, email: &str, code: &str) -> Result<()> {
        let spent = OneTimeCodeRepository::new(self.db.pool())
            .consume(email, code.trim(), Utc::now())
            .await?;
        if !spent {
            debug!("Rejected verification code");
            return Err(VaultError::Validation(
                "invalid or expired verification code".to_string(),
            ));
        }
        Ok(())
    }

    /// Delete expired codes. Returns the number removed.
    pub async fn prune_expired(&self) -> Result<u64> {
        OneTimeCodeRepository::new(self.db.pool())
            .delete_expired(Utc::now())
            .await
    }
}
