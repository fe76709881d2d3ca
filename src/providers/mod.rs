//! Upstream package providers behind a common capability.
//!
//! Each provider answers one question (the latest version of a package
//! after filtering) and hides its upstream protocol, authentication, and
//! degradation behavior behind [`PackageProvider`]. The registry hands out
//! the variant keyed by the route's `provider` parameter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::version::VersionFilters;

pub mod breaker;
pub mod github;
pub mod nuget;
pub mod upstream;

/// Resolved package metadata for a badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    pub provider: &'static str,
    pub name: String,
    pub version: String,
    pub is_prerelease: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub upstream_etag: Option<String>,
    pub upstream_last_modified: Option<String>,
}

/// Outcome of a provider lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLookup {
    /// Fresh answer straight from upstream (or a revalidated 304).
    Fresh(PackageInfo),
    /// Served from the last cached upstream snapshot while upstream is
    /// degraded; clients get a shorter cache window.
    Stale(PackageInfo),
    /// Upstream answered but nothing matches.
    NotFound { reason: &'static str },
}

/// Failures a provider can surface across the handler boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider needs an organization and the route did not supply one.
    #[error("Organization is required for GitHub provider")]
    OrgRequired,
    /// Upstream unreachable (or circuit open) and no cache to fall back to.
    #[error("upstream unavailable")]
    Unavailable,
    /// Secret store or other internal dependency failed.
    #[error("internal provider error")]
    Internal,
}

/// Common capability implemented by every provider variant.
#[async_trait]
pub trait PackageProvider: Send + Sync {
    /// Registry key, route segment, and badge label.
    fn key(&self) -> &'static str;

    /// Shields `namedLogo` for this provider's badges.
    fn logo(&self) -> Option<&'static str>;

    /// Latest package version passing `filters`.
    async fn get_latest(
        &self,
        org: Option<&str>,
        package: &str,
        filters: &VersionFilters,
    ) -> Result<PackageLookup, ProviderError>;
}

/// Provider singleton registry, built once at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn PackageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, provider: Arc<dyn PackageProvider>) -> Self {
        self.providers.insert(provider.key(), provider);
        self
    }

    /// Looks a provider up by its route parameter, case-insensitively.
    pub fn get(&self, key: &str) -> Option<Arc<dyn PackageProvider>> {
        self.providers
            .iter()
            .find(|(registered, _)| registered.eq_ignore_ascii_case(key))
            .map(|(_, provider)| provider.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider;

    #[async_trait]
    impl PackageProvider for FakeProvider {
        fn key(&self) -> &'static str {
            "nuget"
        }
        fn logo(&self) -> Option<&'static str> {
            Some("nuget")
        }
        async fn get_latest(
            &self,
            _org: Option<&str>,
            _package: &str,
            _filters: &VersionFilters,
        ) -> Result<PackageLookup, ProviderError> {
            Ok(PackageLookup::NotFound {
                reason: "not found",
            })
        }
    }

    #[test]
    fn registry_lookup_is_case_insensitive() {
        let registry = ProviderRegistry::new().register(Arc::new(FakeProvider));
        assert!(registry.get("NuGet").is_some());
        assert!(registry.get("npm").is_none());
    }
}
