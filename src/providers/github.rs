//! GitHub Packages provider.
//!
//! Packages live under an organization, so the `org` route parameter is
//! mandatory here. Version listings come from
//! `GET {base}/orgs/{org}/packages/nuget/{package}/versions`, authenticated
//! with the per-org token from the secret resolver when one is configured
//! (anonymous listing only works for public packages).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::ACCEPT;
use serde::Deserialize;

use crate::providers::upstream::{FetchOutcome, UpstreamClient, UpstreamSnapshot, VersionEntry};
use crate::providers::{PackageInfo, PackageLookup, PackageProvider, ProviderError};
use crate::secrets::SecretResolver;
use crate::version::{self, VersionFilters};

const GITHUB_API_VERSION: &str = "2022-11-28";

pub struct GitHubProvider {
    upstream: Arc<UpstreamClient>,
    secrets: Arc<SecretResolver>,
    base_url: String,
}

impl GitHubProvider {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        secrets: Arc<SecretResolver>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            upstream,
            secrets,
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PackageVersion {
    name: String,
    created_at: Option<DateTime<Utc>>,
}

fn parse_versions(body: &Bytes) -> Result<Vec<VersionEntry>, ProviderError> {
    let versions: Vec<PackageVersion> =
        serde_json::from_slice(body).map_err(|_| ProviderError::Unavailable)?;
    Ok(versions
        .into_iter()
        .map(|v| VersionEntry {
            version: v.name,
            published_at: v.created_at,
        })
        .collect())
}

fn build_info(
    snapshot: &UpstreamSnapshot,
    package: &str,
    filters: &VersionFilters,
) -> Option<PackageInfo> {
    let (raw, parsed) = version::select_latest(
        snapshot.versions.iter().map(|entry| entry.version.as_str()),
        filters,
    )?;
    let published_at = snapshot
        .versions
        .iter()
        .find(|entry| entry.version == raw)
        .and_then(|entry| entry.published_at);
    Some(PackageInfo {
        provider: "github",
        name: package.to_string(),
        version: raw,
        is_prerelease: !parsed.pre.is_empty(),
        published_at,
        upstream_etag: snapshot.etag.clone(),
        upstream_last_modified: snapshot.last_modified.clone(),
    })
}

#[async_trait]
impl PackageProvider for GitHubProvider {
    fn key(&self) -> &'static str {
        "github"
    }

    fn logo(&self) -> Option<&'static str> {
        Some("github")
    }

    async fn get_latest(
        &self,
        org: Option<&str>,
        package: &str,
        filters: &VersionFilters,
    ) -> Result<PackageLookup, ProviderError> {
        let org = match org {
            Some(org) if !org.is_empty() => org,
            _ => return Err(ProviderError::OrgRequired),
        };

        let token = self
            .secrets
            .provider_token("github", org)
            .await
            .map_err(|_| ProviderError::Internal)?;

        let package_lower = package.to_ascii_lowercase();
        let cache_key = format!("github#{org}#{package_lower}");
        let url = format!(
            "{}/orgs/{org}/packages/nuget/{package}/versions?per_page=100",
            self.base_url.trim_end_matches('/'),
        );

        let outcome = self
            .upstream
            .fetch_versions(
                &cache_key,
                |http| {
                    let mut request = http
                        .get(&url)
                        .header(ACCEPT, "application/vnd.github+json")
                        .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
                    if let Some(token) = &token {
                        request = request.bearer_auth(token.expose());
                    }
                    request
                },
                parse_versions,
            )
            .await?;

        Ok(match outcome {
            FetchOutcome::Fresh(snapshot) => match build_info(&snapshot, package, filters) {
                Some(info) => PackageLookup::Fresh(info),
                None => PackageLookup::NotFound {
                    reason: version::NO_MATCHING_VERSIONS,
                },
            },
            FetchOutcome::Stale(snapshot) => match build_info(&snapshot, package, filters) {
                Some(info) => PackageLookup::Stale(info),
                None => PackageLookup::NotFound {
                    reason: version::NO_MATCHING_VERSIONS,
                },
            },
            FetchOutcome::NotFound => PackageLookup::NotFound {
                reason: "not found",
            },
        })
    }
}
