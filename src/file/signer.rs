//! Signed URL generation and verification.
//!
//! Upload handles and CDN download links are plain URLs carrying an
//! `expires` timestamp and an HMAC-SHA256 `signature` over the path and the
//! preceding query parameters.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::{Result, VaultError};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PARAM: &str = "signature";
const EXPIRES_PARAM: &str = "expires";

/// How a downloaded file should be presented by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Display in the browser.
    Inline,
    /// Force a download.
    Attachment,
}

impl Disposition {
    /// Header token for this disposition.
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

/// HMAC signer for time-limited URLs.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").finish_non_exhaustive()
    }
}

impl UrlSigner {
    /// Create a signer with the given secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(VaultError::Config("signing secret must not be empty".to_string()));
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    /// Build a signed URL for `key` under `base_url`.
    pub fn sign(
        &self,
        base_url: &str,
        key: &str,
        params: &[(&str, &str)],
        expires_at: DateTime<Utc>,
    ) -> Result<Url> {
        let mut url = Url::parse(base_url)
            .map_err(|e| VaultError::Config(format!("invalid base url {base_url}: {e}")))?;

        url.path_segments_mut()
            .map_err(|_| VaultError::Config(format!("base url cannot have paths: {base_url}")))?
            .pop_if_empty()
            .push(key);

        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in params {
                pairs.append_pair(name, value);
            }
            pairs.append_pair(EXPIRES_PARAM, &expires_at.timestamp().to_string());
        }

        let signature = self.digest(&canonical_payload(&url))?;
        url.query_pairs_mut().append_pair(SIGNATURE_PARAM, &signature);
        Ok(url)
    }

    /// Verify a signed URL and return the object key it grants access to.
    pub fn verify(&self, url: &Url, now: DateTime<Utc>) -> Result<String> {
        let mut unsigned = url.clone();
        let mut signature = None;
        let mut expires = None;
        {
            let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
            let mut query = unsigned.query_pairs_mut();
            query.clear();
            for (name, value) in pairs {
                if name == SIGNATURE_PARAM {
                    signature = Some(value);
                    continue;
                }
                if name == EXPIRES_PARAM {
                    expires = value.parse::<i64>().ok();
                }
                query.append_pair(&name, &value);
            }
        }

        let signature = signature.ok_or_else(|| VaultError::Auth("unsigned url".to_string()))?;
        let expected = hex::decode(signature)
            .map_err(|_| VaultError::Auth("malformed url signature".to_string()))?;

        let mut mac = self.mac()?;
        mac.update(canonical_payload(&unsigned).as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| VaultError::Auth("bad url signature".to_string()))?;

        let expires_at = expires
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .ok_or_else(|| VaultError::Auth("url has no expiry".to_string()))?;
        if now >= expires_at {
            return Err(VaultError::Auth("url expired".to_string()));
        }

        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|key| !key.is_empty())
            .map(|key| {
                urlencoding::decode(key)
                    .map(|k| k.into_owned())
                    .unwrap_or_else(|_| key.to_string())
            })
            .ok_or_else(|| VaultError::Auth("url names no object".to_string()))
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| VaultError::Config(format!("invalid signing key: {e}")))
    }

    fn digest(&self, payload: &str) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn canonical_payload(url: &Url) -> String {
    format!("{}?{}", url.path(), url.query().unwrap_or_default())
}

/// CDN capability issuing signed GET URLs.
pub trait DownloadSigner: Send + Sync {
    /// Create a signed GET URL for `key`, presented as `filename`.
    fn signed_get_url(
        &self,
        key: &str,
        disposition: Disposition,
        filename: &str,
        ttl: Duration,
    ) -> Result<String>;
}

/// Signed-URL issuer for a CDN distribution.
#[derive(Debug, Clone)]
pub struct CdnSigner {
    base_url: String,
    signer: UrlSigner,
}

impl CdnSigner {
    /// Create a new CdnSigner for the distribution at `base_url`.
    pub fn new(base_url: impl Into<String>, signer: UrlSigner) -> Self {
        Self {
            base_url: base_url.into(),
            signer,
        }
    }
}

impl DownloadSigner for CdnSigner {
    fn signed_get_url(
        &self,
        key: &str,
        disposition: Disposition,
        filename: &str,
        ttl: Duration,
    ) -> Result<String> {
        let value = content_disposition(disposition, filename);
        let url = self.signer.sign(
            &self.base_url,
            key,
            &[("response-content-disposition", &value)],
            Utc::now() + ttl,
        )?;
        Ok(url.to_string())
    }
}

/// Build a Content-Disposition value with an ASCII-safe fallback name.
pub fn content_disposition(disposition: Disposition, filename: &str) -> String {
    let safe: String = filename
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| *c != '"' && c.is_ascii() && !c.is_ascii_control())
        .collect();

    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition.as_str(),
        safe,
        urlencoding::encode(filename)
    )
}
