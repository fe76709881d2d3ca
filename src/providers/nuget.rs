//! NuGet package provider.
//!
//! Versions come from the flat-container index:
//! `GET {base}/v3-flatcontainer/{package-lowercased}/index.json`, a plain
//! `{"versions": [...]}` document. NuGet has no organization concept; the
//! `org` route parameter is ignored when present.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

use crate::providers::upstream::{FetchOutcome, UpstreamClient, UpstreamSnapshot, VersionEntry};
use crate::providers::{PackageInfo, PackageLookup, PackageProvider, ProviderError};
use crate::version::{self, VersionFilters};

pub struct NuGetProvider {
    upstream: Arc<UpstreamClient>,
    base_url: String,
}

impl NuGetProvider {
    pub fn new(upstream: Arc<UpstreamClient>, base_url: impl Into<String>) -> Self {
        Self {
            upstream,
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FlatContainerIndex {
    versions: Vec<String>,
}

fn parse_index(body: &Bytes) -> Result<Vec<VersionEntry>, ProviderError> {
    let index: FlatContainerIndex =
        serde_json::from_slice(body).map_err(|_| ProviderError::Unavailable)?;
    Ok(index.versions.into_iter().map(VersionEntry::bare).collect())
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
        provider: "nuget",
        name: package.to_string(),
        version: raw,
        is_prerelease: !parsed.pre.is_empty(),
        published_at,
        upstream_etag: snapshot.etag.clone(),
        upstream_last_modified: snapshot.last_modified.clone(),
    })
}

#[async_trait]
impl PackageProvider for NuGetProvider {
    fn key(&self) -> &'static str {
        "nuget"
    }

    fn logo(&self) -> Option<&'static str> {
        Some("nuget")
    }

    async fn get_latest(
        &self,
        _org: Option<&str>,
        package: &str,
        filters: &VersionFilters,
    ) -> Result<PackageLookup, ProviderError> {
        let package_lower = package.to_ascii_lowercase();
        let cache_key = format!("nuget#{package_lower}");
        let url = format!(
            "{}/v3-flatcontainer/{}/index.json",
            self.base_url.trim_end_matches('/'),
            package_lower
        );

        let outcome = self
            .upstream
            .fetch_versions(&cache_key, |http| http.get(&url), parse_index)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_flat_container_index() {
        let body = Bytes::from_static(br#"{"versions":["12.0.3","13.0.1","14.0.0-preview1"]}"#);
        let entries = parse_index(&body).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].version, "13.0.1");
    }

    #[test]
    fn malformed_index_is_unavailable() {
        let body = Bytes::from_static(b"<html>maintenance</html>");
        assert!(matches!(
            parse_index(&body),
            Err(ProviderError::Unavailable)
        ));
    }

    #[test]
    fn stable_selection_skips_prereleases() {
        let snapshot = UpstreamSnapshot {
            versions: std::sync::Arc::new(vec![
                VersionEntry::bare("12.0.3"),
                VersionEntry::bare("13.0.1"),
                VersionEntry::bare("14.0.0-preview1"),
            ]),
            etag: Some("\"tag\"".to_string()),
            last_modified: None,
        };
        let info = build_info(&snapshot, "Newtonsoft.Json", &VersionFilters::default()).unwrap();
        assert_eq!(info.version, "13.0.1");
        assert!(!info.is_prerelease);
        assert_eq!(info.upstream_etag.as_deref(), Some("\"tag\""));
    }

    #[test]
    fn empty_filter_result_reports_no_matching_versions() {
        let snapshot = UpstreamSnapshot {
            versions: std::sync::Arc::new(vec![VersionEntry::bare("1.0.0")]),
            etag: None,
            last_modified: None,
        };
        let filters = VersionFilters::from_query("gt=2.0.0").unwrap();
        assert!(build_info(&snapshot, "pkg", &filters).is_none());
    }
}
