//! Time-limited signed retrieval URLs.
//!
//! A URL is `{base}/storage/documents/{key}?expires={unix}&signature={b64}`
//! where the signature is HMAC-SHA256 over `"{key}\n{expires}"`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const MAX_SIGNATURE_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Signed URL has expired")]
    Expired,
    #[error("Signature is invalid")]
    Invalid,
    #[error("Signing key rejected")]
    InvalidKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

pub struct UrlSigner {
    mac: HmacSha256,
    base_url: String,
    ttl_secs: i64,
}

impl UrlSigner {
    pub fn new(secret: &[u8], base_url: &str, ttl_secs: i64) -> Result<Self, SignatureError> {
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self {
            mac,
            base_url: base_url.trim_end_matches('/').to_string(),
            ttl_secs,
        })
    }

    pub fn sign(&self, key: &str, now: DateTime<Utc>) -> SignedUrl {
        // Round up so a link never lives shorter than the TTL.
        let expires =
            now.timestamp() + self.ttl_secs + i64::from(now.timestamp_subsec_nanos() > 0);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(key, expires));
        SignedUrl {
            url: format!(
                "{}/storage/documents/{}?expires={}&signature={}",
                self.base_url, key, expires, signature
            ),
            expires_at: DateTime::from_timestamp(expires, 0).unwrap_or(now),
        }
    }

    /// Check a presented signature. Comparison is constant-time.
    pub fn verify(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        if signature.len() > MAX_SIGNATURE_LEN {
            return Err(SignatureError::Invalid);
        }
        let presented = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SignatureError::Invalid)?;

        let mut mac = self.mac.clone();
        mac.update(message(key, expires).as_bytes());
        mac.verify_slice(&presented)
            .map_err(|_| SignatureError::Invalid)?;

        if now.timestamp() >= expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }

    fn mac(&self, key: &str, expires: i64) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(message(key, expires).as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn message(key: &str, expires: i64) -> String {
    format!("{key}\n{expires}")
}
