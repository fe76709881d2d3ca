//! Secret material backend.
//!
//! The real secret manager is an external collaborator; the request core
//! only needs one operation from it: fetch raw JSON material for a mapping
//! key. Keys follow the `SECRET#…` layout (`SECRET#hmac#<owner/repo>` for
//! repo HMAC keys, `SECRET#<provider>#<org>` for provider tokens). Values
//! are opaque to the backend; the resolver parses and caches them.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::store::StoreError;

/// Interface to the secret manager.
#[async_trait]
pub trait SecretsBackend: Send + Sync {
    /// Fetches the raw JSON material stored under `key`, if any.
    async fn fetch(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// File-seeded backend for local runs and tests.
///
/// The seed file is a flat JSON object mapping secret keys to their JSON
/// material, e.g.
/// `{"SECRET#hmac#acme/widget": {"hmac_key": "...", "type": "hmac"}}`.
#[derive(Debug, Default)]
pub struct FileSecretsBackend {
    entries: HashMap<String, String>,
}

impl FileSecretsBackend {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Loads the seed file eagerly; malformed files refuse to start.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Unavailable(format!("secrets file: {e}")))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, StoreError> {
        let parsed: HashMap<String, serde_json::Value> = serde_json::from_str(raw)
            .map_err(|e| StoreError::Unavailable(format!("secrets file: {e}")))?;
        let entries = parsed
            .into_iter()
            .map(|(key, value)| (key, value.to_string()))
            .collect();
        Ok(Self { entries })
    }

    pub fn insert(&mut self, key: impl Into<String>, material: impl Into<String>) {
        self.entries.insert(key.into(), material.into());
    }
}

#[async_trait]
impl SecretsBackend for FileSecretsBackend {
    async fn fetch(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seed_file_round_trips_material() {
        let backend = FileSecretsBackend::from_json(
            r#"{"SECRET#hmac#acme/widget": {"hmac_key": "k1", "type": "hmac"}}"#,
        )
        .unwrap();
        let material = backend.fetch("SECRET#hmac#acme/widget").await.unwrap();
        assert!(material.unwrap().contains("k1"));
        assert!(backend.fetch("SECRET#hmac#other").await.unwrap().is_none());
    }

    #[test]
    fn malformed_seed_is_rejected() {
        assert!(FileSecretsBackend::from_json("not json").is_err());
    }
}
