//! Shared upstream HTTP machinery: conditional GETs, bounded retry,
//! degradation to cache, and backpressure.
//!
//! Every provider fetch goes through [`UpstreamClient::fetch_versions`],
//! which layers the reliability policy in one place:
//!
//! - the circuit breaker is consulted first; an open breaker short-circuits
//!   to the cached snapshot (stale) or `Unavailable` without any I/O,
//! - a per-client semaphore bounds concurrent upstream calls; saturation
//!   answers immediately instead of queueing,
//! - stored `ETag`/`Last-Modified` validators ride along and a `304` renews
//!   the cached snapshot for free,
//! - transport errors, `429`, and `5xx` retry with capped exponential
//!   backoff (3 attempts), then degrade to the cached snapshot when one
//!   exists,
//! - `404` is a definitive, healthy answer: the package does not exist.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::StatusCode;
use http::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use tokio::sync::Semaphore;

use crate::providers::ProviderError;
use crate::providers::breaker::{BreakerConfig, CircuitBreaker};

/// One upstream version with whatever metadata the feed exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    pub version: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl VersionEntry {
    pub fn bare(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            published_at: None,
        }
    }
}

/// Cached upstream state for one `(provider, org?, package)` key.
#[derive(Debug, Clone)]
pub struct UpstreamSnapshot {
    pub versions: Arc<Vec<VersionEntry>>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Result of an upstream fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Fresh(UpstreamSnapshot),
    Stale(UpstreamSnapshot),
    NotFound,
}

/// Upstream policy knobs.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub concurrency: usize,
    pub breaker: BreakerConfig,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_millis(200),
            backoff_cap: Duration::from_secs(2),
            concurrency: 8,
            breaker: BreakerConfig::default(),
        }
    }
}

/// Shared upstream client; one per process, used by every provider.
pub struct UpstreamClient {
    http: reqwest::Client,
    cache: DashMap<String, UpstreamSnapshot>,
    breaker: CircuitBreaker,
    permits: Semaphore,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("badgesmith/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            cache: DashMap::new(),
            breaker: CircuitBreaker::new(config.breaker),
            permits: Semaphore::new(config.concurrency),
            config,
        })
    }

    /// Fetches the version list for `key`, with the full reliability policy.
    ///
    /// `build_request` creates the provider-specific request; `parse` turns
    /// a successful body into version entries.
    pub async fn fetch_versions<B, P>(
        &self,
        key: &str,
        build_request: B,
        parse: P,
    ) -> Result<FetchOutcome, ProviderError>
    where
        B: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
        P: Fn(&Bytes) -> Result<Vec<VersionEntry>, ProviderError>,
    {
        let cached = self.cache.get(key).map(|entry| entry.clone());

        if !self.breaker.allow(key) {
            tracing::debug!(%key, "circuit open, skipping upstream");
            return Self::degrade(cached);
        }

        let _permit = match self.permits.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(%key, "upstream concurrency saturated");
                return Self::degrade(cached);
            }
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let mut request = build_request(&self.http).timeout(self.config.timeout);
            if let Some(snapshot) = &cached {
                if let Some(etag) = &snapshot.etag {
                    request = request.header(IF_NONE_MATCH, etag.as_str());
                }
                if let Some(last_modified) = &snapshot.last_modified {
                    request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
                }
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_MODIFIED {
                        if let Some(snapshot) = &cached {
                            self.breaker.record_success(key);
                            return Ok(FetchOutcome::Fresh(snapshot.clone()));
                        }
                        // A 304 without a stored validator is an upstream
                        // protocol violation; treat it as a failed attempt.
                    } else if status.is_success() {
                        let etag = header_string(response.headers(), &ETAG);
                        let last_modified = header_string(response.headers(), &LAST_MODIFIED);
                        let body = match response.bytes().await {
                            Ok(body) => body,
                            Err(err) => {
                                if attempt < self.config.max_attempts {
                                    self.backoff(attempt).await;
                                    continue;
                                }
                                tracing::warn!(%key, error = %err, "upstream body read failed");
                                self.breaker.record_failure(key);
                                return Self::degrade(cached);
                            }
                        };
                        let versions = parse(&body)?;
                        let snapshot = UpstreamSnapshot {
                            versions: Arc::new(versions),
                            etag,
                            last_modified,
                        };
                        self.cache.insert(key.to_string(), snapshot.clone());
                        self.breaker.record_success(key);
                        return Ok(FetchOutcome::Fresh(snapshot));
                    } else if status == StatusCode::NOT_FOUND {
                        // Definitive answer from a healthy upstream.
                        self.breaker.record_success(key);
                        return Ok(FetchOutcome::NotFound);
                    } else if !retryable(status) {
                        tracing::warn!(%key, %status, "upstream refused the request");
                        self.breaker.record_failure(key);
                        return Self::degrade(cached);
                    }

                    if attempt < self.config.max_attempts {
                        self.backoff(attempt).await;
                        continue;
                    }
                    tracing::warn!(%key, %status, "upstream still failing after retries");
                    self.breaker.record_failure(key);
                    return Self::degrade(cached);
                }
                Err(err) => {
                    if attempt < self.config.max_attempts {
                        self.backoff(attempt).await;
                        continue;
                    }
                    tracing::warn!(%key, error = %err, "upstream unreachable");
                    self.breaker.record_failure(key);
                    return Self::degrade(cached);
                }
            }
        }
    }

    /// Serve the cached snapshot as stale, or give up.
    fn degrade(cached: Option<UpstreamSnapshot>) -> Result<FetchOutcome, ProviderError> {
        match cached {
            Some(snapshot) => Ok(FetchOutcome::Stale(snapshot)),
            None => Err(ProviderError::Unavailable),
        }
    }

    async fn backoff(&self, attempt: u32) {
        let exp = self.config.backoff_base.saturating_mul(1 << (attempt - 1).min(8));
        tokio::time::sleep(exp.min(self.config.backoff_cap)).await;
    }

    #[cfg(test)]
    pub(crate) fn seed_cache(&self, key: &str, snapshot: UpstreamSnapshot) {
        self.cache.insert(key.to_string(), snapshot);
    }

    #[cfg(test)]
    pub(crate) fn trip_breaker(&self, key: &str) {
        for _ in 0..self.config.breaker.failure_threshold {
            self.breaker.record_failure(key);
        }
    }
}

fn retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn header_string(headers: &http::HeaderMap, name: &http::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}
