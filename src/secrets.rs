//! Secret resolution with TTL caching and single-flight fetches.
//!
//! Maps `(provider, org)` to upstream tokens and repo identifiers to HMAC
//! keys. Parsed material is cached in-process for an hour; misses are cached
//! for a short negative TTL so unknown keys cannot stampede the backend.
//! Exactly one fetch per key is in flight at a time; concurrent lookups wait
//! on the same slot instead of fanning out to the secret store.
//!
//! Secret values never appear in logs or `Debug` output; cache keys may.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::store::StoreError;
use crate::store::secrets::SecretsBackend;

/// A wrapper around values containing secret material.
///
/// The wrapper cannot leak through `Debug`, `Display`, or serde; callers
/// must go through [`Secret::expose`] deliberately.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("*****")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("*****")
    }
}

impl<T> serde::Serialize for Secret<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str("*****")
    }
}

/// Parsed secret material: `{hmac_key|token, type}`.
#[derive(Debug, Deserialize)]
struct SecretMaterial {
    hmac_key: Option<String>,
    token: Option<String>,
    #[serde(rename = "type")]
    #[allow(dead_code)]
    kind: Option<String>,
}

/// One cache slot; the `OnceCell` is what coalesces concurrent fetches.
struct Slot {
    created: Instant,
    cell: OnceCell<Option<Arc<SecretMaterial>>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            created: Instant::now(),
            cell: OnceCell::new(),
        }
    }
}

/// Cached resolver in front of the secret backend.
pub struct SecretResolver {
    backend: Arc<dyn SecretsBackend>,
    cache: DashMap<String, Arc<Slot>>,
    positive_ttl: Duration,
    negative_ttl: Duration,
}

impl SecretResolver {
    pub fn new(backend: Arc<dyn SecretsBackend>) -> Self {
        Self {
            backend,
            cache: DashMap::new(),
            positive_ttl: Duration::from_secs(3600),
            negative_ttl: Duration::from_secs(60),
        }
    }

    pub fn with_ttls(mut self, positive: Duration, negative: Duration) -> Self {
        self.positive_ttl = positive;
        self.negative_ttl = negative;
        self
    }

    fn repo_key(repo: &str) -> String {
        format!("SECRET#hmac#{repo}")
    }

    fn token_key(provider: &str, org: &str) -> String {
        format!("SECRET#{provider}#{org}")
    }

    /// HMAC key bytes for a repo identifier, if the repo is registered.
    pub async fn repo_hmac_key(&self, repo: &str) -> Result<Option<Secret<Vec<u8>>>, StoreError> {
        let material = self.material(&Self::repo_key(repo)).await?;
        Ok(material.and_then(|m| {
            m.hmac_key
                .as_ref()
                .map(|key| Secret::from(key.as_bytes().to_vec()))
        }))
    }

    /// Upstream API token for `(provider, org)`, if one is configured.
    pub async fn provider_token(
        &self,
        provider: &str,
        org: &str,
    ) -> Result<Option<Secret<String>>, StoreError> {
        let material = self.material(&Self::token_key(provider, org)).await?;
        Ok(material.and_then(|m| m.token.clone().map(Secret::from)))
    }

    /// Drops the cached entry for a repo key after a rotation.
    pub fn invalidate_repo(&self, repo: &str) {
        self.cache.remove(&Self::repo_key(repo));
    }

    /// Drops the cached entry for a provider token after a rotation.
    pub fn invalidate_token(&self, provider: &str, org: &str) {
        self.cache.remove(&Self::token_key(provider, org));
    }

    /// Fetches, parses, and caches material for `key` with single-flight
    /// semantics.
    async fn material(&self, key: &str) -> Result<Option<Arc<SecretMaterial>>, StoreError> {
        loop {
            let slot = self
                .cache
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Slot::new()))
                .clone();

            if let Some(value) = slot.cell.get() {
                let ttl = if value.is_some() {
                    self.positive_ttl
                } else {
                    self.negative_ttl
                };
                if slot.created.elapsed() < ttl {
                    return Ok(value.clone());
                }
                // Expired: retire this slot (unless somebody already did)
                // and take another pass.
                self.cache.remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
                continue;
            }

            let result = slot
                .cell
                .get_or_try_init(|| async {
                    let raw = self.backend.fetch(key).await?;
                    Ok::<_, StoreError>(raw.and_then(|raw| parse_material(key, &raw)))
                })
                .await;
            match result {
                Ok(value) => return Ok(value.clone()),
                Err(err) => {
                    // Failed fetches are not cached.
                    self.cache.remove_if(key, |_, current| Arc::ptr_eq(current, &slot));
                    return Err(err);
                }
            }
        }
    }
}

fn parse_material(key: &str, raw: &str) -> Option<Arc<SecretMaterial>> {
    match serde_json::from_str::<SecretMaterial>(raw) {
        Ok(material) => Some(Arc::new(material)),
        Err(_) => {
            tracing::warn!(%key, "secret material is not valid JSON, treating as missing");
            None
        }
    }
}
