//! Signed clip delivery tokens.
//!
//! A token is `base64url(json).base64url(hmac_sha256(base64url(json)))` and
//! grants read access to one file of one job until its expiry.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use hookclip_models::JobId;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::warn;

use crate::error::{StorageError, StorageResult, TokenError};

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime (1 hour).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Delivery configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// HMAC key
    pub signing_secret: String,
    pub token_ttl: Duration,
}

impl DeliveryConfig {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
        }
    }

    /// Create config from environment variables.
    ///
    /// Without `DELIVERY_SIGNING_SECRET` a random per-process secret is used,
    /// so links stop working after a restart.
    pub fn from_env() -> Self {
        let signing_secret = match std::env::var("DELIVERY_SIGNING_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("DELIVERY_SIGNING_SECRET not set, using an ephemeral signing key");
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
            }
        };

        Self {
            signing_secret,
            token_ttl: Duration::from_secs(
                std::env::var("DELIVERY_TOKEN_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TOKEN_TTL_SECS),
            ),
        }
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryToken {
    pub job_id: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Expiry timestamp (Unix seconds).
    pub exp: u64,
}

impl DeliveryToken {
    pub fn new(job_id: &JobId, filename: &str, owner: Option<&str>, ttl: Duration) -> Self {
        Self {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            owner: owner.map(str::to_string),
            exp: now_secs() + ttl.as_secs(),
        }
    }

    pub fn is_expired(&self) -> bool {
        now_secs() >= self.exp
    }

    fn mac(secret: &str) -> StorageResult<HmacSha256> {
        HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| StorageError::config_error(format!("Invalid HMAC key: {}", e)))
    }

    /// Sign the token with HMAC-SHA256.
    pub fn sign(&self, secret: &str) -> StorageResult<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?);
        let mut mac = Self::mac(secret)?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Verify signature and expiry of a signed token.
    pub fn verify(signed: &str, secret: &str) -> StorageResult<Self> {
        let (payload, sig_encoded) = signed.split_once('.').ok_or(TokenError::Malformed)?;
        let sig_bytes = URL_SAFE_NO_PAD
            .decode(sig_encoded)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = Self::mac(secret)?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig_bytes)
            .map_err(|_| TokenError::BadSignature)?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let token: Self = serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)?;

        if token.is_expired() {
            return Err(TokenError::Expired.into());
        }
        Ok(token)
    }

    /// Check the token was issued for this file of this job and its owner.
    pub fn authorize(&self, job_id: &JobId, filename: &str, owner: Option<&str>) -> StorageResult<()> {
        if self.job_id != job_id.as_str() || self.filename != filename || self.owner.as_deref() != owner {
            return Err(TokenError::Forbidden.into());
        }
        Ok(())
    }
}

/// Issues and checks clip links.
#[derive(Debug, Clone)]
pub struct DeliverySigner {
    config: DeliveryConfig,
}

impl DeliverySigner {
    pub fn new(config: DeliveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Signed token for one clip file.
    pub fn issue(&self, job_id: &JobId, filename: &str, owner: Option<&str>) -> StorageResult<String> {
        DeliveryToken::new(job_id, filename, owner, self.config.token_ttl).sign(&self.config.signing_secret)
    }

    /// Relative download URL carrying a fresh token.
    pub fn clip_url(&self, job_id: &JobId, filename: &str, owner: Option<&str>) -> StorageResult<String> {
        let token = self.issue(job_id, filename, owner)?;
        Ok(format!(
            "/api/clips/{}/{}?token={}",
            urlencoding::encode(job_id.as_str()),
            urlencoding::encode(filename),
            token
        ))
    }

    /// Verify `signed` and check it grants access to `filename` of `job_id`.
    pub fn check(
        &self,
        signed: &str,
        job_id: &JobId,
        filename: &str,
        owner: Option<&str>,
    ) -> StorageResult<DeliveryToken> {
        let token = DeliveryToken::verify(signed, &self.config.signing_secret)?;
        token.authorize(job_id, filename, owner)?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn token_err(result: StorageResult<DeliveryToken>) -> TokenError {
        match result {
            Err(StorageError::Token(e)) => e,
            other => panic!("expected token error, got {:?}", other),
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let id = JobId::from_string("job-1");
        let token = DeliveryToken::new(&id, "clip_1.mp4", Some("alice"), Duration::from_secs(60));
        let signed = token.sign(SECRET).unwrap();

        let verified = DeliveryToken::verify(&signed, SECRET).unwrap();
        assert_eq!(verified, token);
        assert!(verified.authorize(&id, "clip_1.mp4", Some("alice")).is_ok());
    }

    #[test]
    fn test_verify_rejections() {
        let id = JobId::from_string("job-1");
        let signed = DeliveryToken::new(&id, "clip_1.mp4", None, Duration::from_secs(60))
            .sign(SECRET)
            .unwrap();

        assert_eq!(token_err(DeliveryToken::verify(&signed, "other")), TokenError::BadSignature);
        assert_eq!(token_err(DeliveryToken::verify("no-dot", SECRET)), TokenError::Malformed);
        assert_eq!(token_err(DeliveryToken::verify("abc.!!!", SECRET)), TokenError::Malformed);

        let (payload, sig) = signed.split_once('.').unwrap();
        let tampered = format!("{}x.{}", payload, sig);
        assert_eq!(token_err(DeliveryToken::verify(&tampered, SECRET)), TokenError::BadSignature);
    }

    #[test]
    fn test_expired_token() {
        let mut token =
            DeliveryToken::new(&JobId::from_string("j"), "clip_1.mp4", None, Duration::from_secs(0));
        token.exp = now_secs().saturating_sub(10);
        let signed = token.sign(SECRET).unwrap();
        assert_eq!(token_err(DeliveryToken::verify(&signed, SECRET)), TokenError::Expired);
    }

    #[test]
    fn test_signer_checks_scope() {
        let signer = DeliverySigner::new(DeliveryConfig::new(SECRET));
        let id = JobId::from_string("job-9");
        let signed = signer.issue(&id, "clip_2.mp4", Some("bob")).unwrap();

        assert!(signer.check(&signed, &id, "clip_2.mp4", Some("bob")).is_ok());
        assert_eq!(token_err(signer.check(&signed, &id, "clip_3.mp4", Some("bob"))), TokenError::Forbidden);
        assert_eq!(token_err(signer.check(&signed, &id, "clip_2.mp4", None)), TokenError::Forbidden);
        assert_eq!(
            token_err(signer.check(&signed, &JobId::from_string("job-8"), "clip_2.mp4", Some("bob"))),
            TokenError::Forbidden
        );
    }

    #[test]
    fn test_clip_url() {
        let signer = DeliverySigner::new(DeliveryConfig::new(SECRET));
        let url = signer.clip_url(&JobId::from_string("job-1"), "clip_1.mp4", None).unwrap();
        assert!(url.starts_with("/api/clips/job-1/clip_1.mp4?token="));
    }
}
