//! Configuration module for skyvault.

use chrono::Duration;
use serde::Deserialize;
use std::path::Path;

use crate::{Result, VaultError};

/// Upper bound for every `*_secs` setting (100 years).
pub const MAX_DURATION_SECS: i64 = 100 * 365 * 24 * 60 * 60;

/// Convert a seconds setting to a Duration, clamped to [`MAX_DURATION_SECS`].
fn clamped_secs(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).map_or(MAX_DURATION_SECS, |s| s.min(MAX_DURATION_SECS)))
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/skyvault.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Object storage and URL signing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the local object store.
    #[serde(default = "default_object_root")]
    pub object_root: String,
    /// Base URL upload handles point at.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Base URL of the CDN serving downloads.
    #[serde(default = "default_cdn_base_url")]
    pub cdn_base_url: String,
    /// Secret used to sign upload and download URLs.
    #[serde(default)]
    pub signing_secret: String,
    /// Lifetime of an upload handle in seconds.
    #[serde(default = "default_upload_url_ttl")]
    pub upload_url_ttl_secs: u64,
    /// Lifetime of a signed download URL in seconds.
    #[serde(default = "default_download_url_ttl")]
    pub download_url_ttl_secs: u64,
}

fn default_object_root() -> String {
    "data/objects".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080/objects".to_string()
}

fn default_cdn_base_url() -> String {
    "http://localhost:8080/cdn".to_string()
}

fn default_upload_url_ttl() -> u64 {
    3600 // 1 hour
}

fn default_download_url_ttl() -> u64 {
    24 * 60 * 60 // 24 hours
}

impl StorageConfig {
    /// Lifetime of an upload handle.
    pub fn upload_url_ttl(&self) -> Duration {
        clamped_secs(self.upload_url_ttl_secs)
    }

    /// Lifetime of a signed download URL.
    pub fn download_url_ttl(&self) -> Duration {
        clamped_secs(self.download_url_ttl_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            object_root: default_object_root(),
            public_base_url: default_public_base_url(),
            cdn_base_url: default_cdn_base_url(),
            signing_secret: String::new(),
            upload_url_ttl_secs: default_upload_url_ttl(),
            download_url_ttl_secs: default_download_url_ttl(),
        }
    }
}

/// Quota configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Storage ceiling assigned to new users.
    #[serde(default = "default_max_storage")]
    pub default_max_storage_bytes: i64,
    /// Age after which an unconfirmed upload is discarded by the sweeper.
    #[serde(default = "default_stale_upload")]
    pub stale_upload_secs: u64,
}

fn default_max_storage() -> i64 {
    15 * 1024 * 1024 * 1024 // 15 GiB
}

fn default_stale_upload() -> u64 {
    24 * 60 * 60
}

impl QuotaConfig {
    /// Age after which an unconfirmed upload counts as stale.
    pub fn stale_upload_after(&self) -> Duration {
        clamped_secs(self.stale_upload_secs)
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_max_storage_bytes: default_max_storage(),
            stale_upload_secs: default_stale_upload(),
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds.
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
    /// Maximum concurrent sessions per user.
    #[serde(default = "default_max_active")]
    pub max_active: usize,
}

fn default_session_ttl() -> u64 {
    7 * 24 * 60 * 60 // 7 days
}

fn default_max_active() -> usize {
    2
}

impl SessionConfig {
    /// Session lifetime.
    pub fn ttl(&self) -> Duration {
        clamped_secs(self.ttl_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            max_active: default_max_active(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/skyvault.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Object storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Quota configuration.
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(VaultError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| VaultError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `SKYVAULT_SIGNING_SECRET`: Override the URL signing secret
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("SKYVAULT_SIGNING_SECRET") {
            if !secret.is_empty() {
                self.storage.signing_secret = secret;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.signing_secret.is_empty() {
            return Err(VaultError::Config(
                "signing_secret is not set. \
                 Set it in config.toml or via SKYVAULT_SIGNING_SECRET environment variable."
                    .to_string(),
            ));
        }
        if self.session.max_active == 0 {
            return Err(VaultError::Config(
                "session.max_active must be at least 1".to_string(),
            ));
        }
        if self.session.ttl_secs == 0 {
            return Err(VaultError::Config(
                "session.ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.quota.default_max_storage_bytes < 0 {
            return Err(VaultError::Config(
                "quota.default_max_storage_bytes must not be negative".to_string(),
            ));
        }
        let durations = [
            ("session.ttl_secs", self.session.ttl_secs),
            ("storage.upload_url_ttl_secs", self.storage.upload_url_ttl_secs),
            ("storage.download_url_ttl_secs", self.storage.download_url_ttl_secs),
            ("quota.stale_upload_secs", self.quota.stale_upload_secs),
        ];
        for (name, secs) in durations {
            if i64::try_from(secs).map_or(true, |s| s > MAX_DURATION_SECS) {
                return Err(VaultError::Config(format!(
                    "{name} must be at most {MAX_DURATION_SECS}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.database.path, "data/skyvault.db");
        assert_eq!(config.storage.object_root, "data/objects");
        assert_eq!(config.storage.upload_url_ttl_secs, 3600);
        assert_eq!(config.storage.download_url_ttl_secs, 86400);
        assert!(config.storage.signing_secret.is_empty());
        assert_eq!(
            config.quota.default_max_storage_bytes,
            15 * 1024 * 1024 * 1024
        );
        assert_eq!(config.quota.stale_upload_secs, 86400);
        assert_eq!(config.session.ttl_secs, 604800);
        assert_eq!(config.session.max_active, 2);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/skyvault.log");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[database]
path = "custom/db.sqlite"

[storage]
object_root = "/srv/objects"
public_base_url = "https://upload.example.com"
cdn_base_url = "https://cdn.example.com"
signing_secret = "s3cret"
upload_url_ttl_secs = 600
download_url_ttl_secs = 300

[quota]
default_max_storage_bytes = 1000
stale_upload_secs = 60

[session]
ttl_secs = 3600
max_active = 5

[logging]
level = "debug"
file = "custom/logs/app.log"
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.database.path, "custom/db.sqlite");
        assert_eq!(config.storage.object_root, "/srv/objects");
        assert_eq!(config.storage.cdn_base_url, "https://cdn.example.com");
        assert_eq!(config.storage.signing_secret, "s3cret");
        assert_eq!(config.storage.upload_url_ttl_secs, 600);
        assert_eq!(config.quota.default_max_storage_bytes, 1000);
        assert_eq!(config.session.max_active, 5);
        assert_eq!(config.logging.level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[session]
max_active = 3
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.session.max_active, 3);
        assert_eq!(config.session.ttl_secs, 604800);
        assert_eq!(config.database.path, "data/skyvault.db");
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("[session\nmax_active = ");
        assert!(matches!(result, Err(VaultError::Config(_))));
    }

    #[test]
    fn test_validate_requires_signing_secret() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_session_cap() {
        let mut config = Config::default();
        config.storage.signing_secret = "secret".to_string();
        config.session.max_active = 0;
        assert!(config.validate().is_err());

        config.session.max_active = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_durations() {
        let mut config = Config::default();
        config.storage.signing_secret = "secret".to_string();
        config.session.ttl_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));
        // Unvalidated values clamp instead of wrapping negative.
        assert_eq!(config.session.ttl(), Duration::seconds(MAX_DURATION_SECS));

        config.session.ttl_secs = 60;
        config.quota.stale_upload_secs = i64::MAX as u64 + 1;
        assert!(config.validate().is_err());
        assert!(config.quota.stale_upload_after() > Duration::zero());

        config.quota.stale_upload_secs = MAX_DURATION_SECS as u64;
        config.storage.upload_url_ttl_secs = MAX_DURATION_SECS as u64 + 1;
        assert!(config.validate().is_err());

        config.storage.upload_url_ttl_secs = 3600;
        assert!(config.validate().is_ok());
        assert_eq!(config.session.ttl(), Duration::seconds(60));
        assert_eq!(config.storage.upload_url_ttl(), Duration::hours(1));
        assert_eq!(config.storage.download_url_ttl(), Duration::days(1));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("definitely/not/here.toml");
        assert!(matches!(result, Err(VaultError::Io(_))));
    }
}
