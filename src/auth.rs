//! HMAC request authentication with skew and replay protection.
//!
//! Ingestion requests carry four headers: `X-Signature` (`sha256=<hex>` over
//! the exact body bytes), `X-Repo-Secret` (the repo identifier the key is
//! looked up under), `X-Timestamp` (RFC 3339 UTC), and `X-Nonce` (opaque,
//! single use). Validation order matters: the nonce is reserved *before* the
//! signature is checked, so a replayed request costs one O(1) conditional
//! write at most and a rejected signature cannot be retried under the same
//! nonce; reservations are deliberately never rolled back.
//!
//! Failure messages are generic; no secret, nonce binding, or matched prefix
//! is ever echoed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::HeaderMap;
use sha2::Sha256;

use crate::error::ApiError;
use crate::secrets::{Secret, SecretResolver};
use crate::store::nonce::NonceStore;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const REPO_SECRET_HEADER: &str = "x-repo-secret";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const NONCE_HEADER: &str = "x-nonce";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Identity attached to a request that passed validation.
#[derive(Debug, Clone)]
pub struct AuthenticatedRequest {
    /// Repo identifier (`owner/repo`) the signing key belongs to.
    pub repo: String,
    /// Client-asserted request time, already checked against the window.
    pub timestamp: DateTime<Utc>,
    /// The nonce this request consumed.
    pub nonce: String,
}

/// Validates signed ingestion requests.
pub struct HmacAuthenticator {
    secrets: std::sync::Arc<SecretResolver>,
    nonces: std::sync::Arc<dyn NonceStore>,
    max_skew: chrono::Duration,
    nonce_ttl: Duration,
}

impl HmacAuthenticator {
    pub fn new(
        secrets: std::sync::Arc<SecretResolver>,
        nonces: std::sync::Arc<dyn NonceStore>,
        max_skew: Duration,
        nonce_ttl: Duration,
    ) -> Self {
        Self {
            secrets,
            nonces,
            max_skew: chrono::Duration::from_std(max_skew)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
            nonce_ttl,
        }
    }

    /// Runs the full validation pipeline against headers and body bytes.
    pub async fn validate(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<AuthenticatedRequest, ApiError> {
        let signature = required_header(headers, SIGNATURE_HEADER)?;
        let repo = required_header(headers, REPO_SECRET_HEADER)?;
        let timestamp_raw = required_header(headers, TIMESTAMP_HEADER)?;
        let nonce = required_header(headers, NONCE_HEADER)?;

        let timestamp = parse_utc_timestamp(timestamp_raw).ok_or(ApiError::InvalidTimestamp)?;
        let now = Utc::now();
        if (now - timestamp).abs() > self.max_skew {
            return Err(ApiError::InvalidTimestamp);
        }

        // Reserve before verifying: replays must fail here, and a failed
        // signature burns its nonce rather than opening a retry oracle.
        let reserved = self
            .nonces
            .try_reserve(nonce, repo, self.nonce_ttl)
            .await
            .map_err(|_| ApiError::Internal)?;
        if !reserved {
            tracing::debug!(%nonce, "nonce already reserved");
            return Err(ApiError::NonceUsed);
        }

        let key = self
            .secrets
            .repo_hmac_key(repo)
            .await
            .map_err(|_| ApiError::Internal)?
            .ok_or(ApiError::Unauthorized)?;

        verify_signature(&key, body, signature)?;

        Ok(AuthenticatedRequest {
            repo: repo.to_string(),
            timestamp,
            nonce: nonce.to_string(),
        })
    }
}

fn required_header<'h>(headers: &'h HeaderMap, name: &str) -> Result<&'h str, ApiError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ApiError::MissingHeaders)
}

/// Parses an RFC 3339 instant, accepting only UTC offsets.
fn parse_utc_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw).ok()?;
    if parsed.offset().local_minus_utc() != 0 {
        return None;
    }
    Some(parsed.with_timezone(&Utc))
}

/// Constant-time signature check via the MAC itself.
fn verify_signature(key: &Secret<Vec<u8>>, body: &[u8], signature: &str) -> Result<(), ApiError> {
    let hex_part = signature
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(ApiError::InvalidSignature)?;
    // hex::decode accepts both cases, which gives the case-insensitive
    // comparison on the hex portion for free.
    let expected = hex::decode(hex_part).map_err(|_| ApiError::InvalidSignature)?;
    let mut mac =
        HmacSha256::new_from_slice(key.expose()).map_err(|_| ApiError::Internal)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| ApiError::InvalidSignature)
}

/// Signs a payload the way clients are expected to: `sha256=<hex>`.
pub fn sign(key: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use crate::store::nonce::MemoryNonceStore;
    use crate::store::secrets::FileSecretsBackend;
    use async_trait::async_trait;
    use http::HeaderValue;
    use std::sync::Arc;

    const KEY: &[u8] = b"super-secret-key";
    const BODY: &[u8] = br#"{"platform":"linux","passed":10}"#;

    fn authenticator() -> HmacAuthenticator {
        let mut backend = FileSecretsBackend::empty();
        backend.insert(
            "SECRET#hmac#acme/widget",
            r#"{"hmac_key": "super-secret-key", "type": "hmac"}"#,
        );
        HmacAuthenticator::new(
            Arc::new(SecretResolver::new(Arc::new(backend))),
            Arc::new(MemoryNonceStore::new()),
            Duration::from_secs(300),
            Duration::from_secs(2700),
        )
    }

    fn headers(signature: &str, nonce: &str, timestamp: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(SIGNATURE_HEADER, HeaderValue::from_str(signature).unwrap());
        map.insert(REPO_SECRET_HEADER, HeaderValue::from_static("acme/widget"));
        map.insert(TIMESTAMP_HEADER, HeaderValue::from_str(timestamp).unwrap());
        map.insert(NONCE_HEADER, HeaderValue::from_str(nonce).unwrap());
        map
    }

    fn now_rfc3339() -> String {
        Utc::now().to_rfc3339()
    }

    #[tokio::test]
    async fn valid_signature_authenticates() {
        let auth = authenticator();
        let headers = headers(&sign(KEY, BODY), "n1", &now_rfc3339());
        let authed = auth.validate(&headers, BODY).await.unwrap();
        assert_eq!(authed.repo, "acme/widget");
        assert_eq!(authed.nonce, "n1");
    }

    #[tokio::test]
    async fn signature_hex_is_case_insensitive() {
        let auth = authenticator();
        let signature = sign(KEY, BODY).to_ascii_uppercase().replace("SHA256=", "sha256=");
        let headers = headers(&signature, "n1", &now_rfc3339());
        assert!(auth.validate(&headers, BODY).await.is_ok());
    }

    #[tokio::test]
    async fn missing_or_blank_headers_are_rejected() {
        let auth = authenticator();
        let mut map = headers(&sign(KEY, BODY), "n1", &now_rfc3339());
        map.remove(NONCE_HEADER);
        assert!(matches!(
            auth.validate(&map, BODY).await,
            Err(ApiError::MissingHeaders)
        ));

        let mut map = headers(&sign(KEY, BODY), "n1", &now_rfc3339());
        map.insert(SIGNATURE_HEADER, HeaderValue::from_static("  "));
        assert!(matches!(
            auth.validate(&map, BODY).await,
            Err(ApiError::MissingHeaders)
        ));
    }

    #[tokio::test]
    async fn tampered_body_fails_with_invalid_signature() {
        let auth = authenticator();
        let headers = headers(&sign(KEY, BODY), "n1", &now_rfc3339());
        let mut tampered = BODY.to_vec();
        tampered[0] ^= 1;
        assert!(matches!(
            auth.validate(&headers, &tampered).await,
            Err(ApiError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn tampered_signature_fails() {
        let auth = authenticator();
        let mut signature = sign(KEY, BODY);
        let flipped = if signature.ends_with('0') { '1' } else { '0' };
        signature.pop();
        signature.push(flipped);
        let headers = headers(&signature, "n1", &now_rfc3339());
        assert!(matches!(
            auth.validate(&headers, BODY).await,
            Err(ApiError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn replayed_nonce_is_rejected() {
        let auth = authenticator();
        let headers = headers(&sign(KEY, BODY), "n1", &now_rfc3339());
        assert!(auth.validate(&headers, BODY).await.is_ok());
        assert!(matches!(
            auth.validate(&headers, BODY).await,
            Err(ApiError::NonceUsed)
        ));
    }

    #[tokio::test]
    async fn skewed_timestamp_is_rejected() {
        let auth = authenticator();
        let stale = (Utc::now() - chrono::Duration::minutes(10)).to_rfc3339();
        let headers = headers(&sign(KEY, BODY), "n1", &stale);
        assert!(matches!(
            auth.validate(&headers, BODY).await,
            Err(ApiError::InvalidTimestamp)
        ));
    }

    #[tokio::test]
    async fn non_utc_timestamp_is_rejected() {
        let auth = authenticator();
        let offset = (Utc::now() + chrono::Duration::hours(2))
            .with_timezone(&chrono::FixedOffset::east_opt(7200).unwrap())
            .to_rfc3339();
        let headers = headers(&sign(KEY, BODY), "n1", &offset);
        assert!(matches!(
            auth.validate(&headers, BODY).await,
            Err(ApiError::InvalidTimestamp)
        ));
    }

    #[tokio::test]
    async fn unknown_repo_secret_is_unauthorized() {
        let auth = authenticator();
        let mut map = headers(&sign(KEY, BODY), "n1", &now_rfc3339());
        map.insert(REPO_SECRET_HEADER, HeaderValue::from_static("ghost/repo"));
        assert!(matches!(
            auth.validate(&map, BODY).await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn nonce_store_failure_fails_closed_without_reserving() {
        struct BrokenStore;
        #[async_trait]
        impl NonceStore for BrokenStore {
            async fn try_reserve(
                &self,
                _nonce: &str,
                _repo: &str,
                _ttl: Duration,
            ) -> Result<bool, StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }
            async fn is_reserved(&self, _nonce: &str) -> Result<bool, StoreError> {
                Err(StoreError::Unavailable("down".to_string()))
            }
        }

        let mut backend = FileSecretsBackend::empty();
        backend.insert("SECRET#hmac#acme/widget", r#"{"hmac_key": "k"}"#);
        let auth = HmacAuthenticator::new(
            Arc::new(SecretResolver::new(Arc::new(backend))),
            Arc::new(BrokenStore),
            Duration::from_secs(300),
            Duration::from_secs(2700),
        );
        let headers = headers(&sign(KEY, BODY), "n1", &now_rfc3339());
        assert!(matches!(
            auth.validate(&headers, BODY).await,
            Err(ApiError::Internal)
        ));
    }
}
