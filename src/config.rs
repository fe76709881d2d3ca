//! Process configuration.
//!
//! Everything is a CLI flag with an environment fallback, so the same binary
//! runs locally (`cargo run -- --secrets-file dev-secrets.json`) and behind
//! a process supervisor that only speaks environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::cors::{CorsMode, CorsPolicy};
use crate::providers::breaker::BreakerConfig;
use crate::providers::upstream::UpstreamConfig;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "badgesmith",
    version,
    about = "Shields-compatible badge service with signed CI result ingestion"
)]
pub struct Config {
    /// Socket address the server binds to.
    #[arg(long, env = "BADGESMITH_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// NuGet API base URL.
    #[arg(
        long,
        env = "BADGESMITH_NUGET_BASE_URL",
        default_value = "https://api.nuget.org"
    )]
    pub nuget_base_url: String,

    /// GitHub API base URL.
    #[arg(
        long,
        env = "BADGESMITH_GITHUB_BASE_URL",
        default_value = "https://api.github.com"
    )]
    pub github_base_url: String,

    /// Seed file for the secrets backend (JSON map of `SECRET#…` keys).
    #[arg(long, env = "BADGESMITH_SECRETS_FILE")]
    pub secrets_file: Option<PathBuf>,

    /// Per-call upstream timeout in seconds.
    #[arg(long, env = "BADGESMITH_UPSTREAM_TIMEOUT_SECS", default_value_t = 10)]
    pub upstream_timeout_secs: u64,

    /// Total handler budget per request in milliseconds.
    #[arg(long, env = "BADGESMITH_REQUEST_DEADLINE_MS", default_value_t = 25_000)]
    pub request_deadline_ms: u64,

    /// Accepted clock skew for signed requests, in seconds.
    #[arg(long, env = "BADGESMITH_AUTH_SKEW_SECS", default_value_t = 300)]
    pub auth_skew_secs: u64,

    /// Replay-protection window for nonces, in seconds.
    #[arg(long, env = "BADGESMITH_NONCE_TTL_SECS", default_value_t = 2_700)]
    pub nonce_ttl_secs: u64,

    /// Idempotency window for run-seen markers, in seconds.
    #[arg(long, env = "BADGESMITH_RUN_MARKER_TTL_SECS", default_value_t = 2_700)]
    pub run_marker_ttl_secs: u64,

    /// Consecutive upstream failures before the circuit opens.
    #[arg(long, env = "BADGESMITH_BREAKER_FAILURE_THRESHOLD", default_value_t = 5)]
    pub breaker_failure_threshold: u32,

    /// Open-circuit cooldown before a probe, in seconds.
    #[arg(long, env = "BADGESMITH_BREAKER_COOLDOWN_SECS", default_value_t = 30)]
    pub breaker_cooldown_secs: u64,

    /// Bound on concurrent upstream calls.
    #[arg(long, env = "BADGESMITH_UPSTREAM_CONCURRENCY", default_value_t = 8)]
    pub upstream_concurrency: usize,

    /// Allowed CORS origins (comma separated). Empty means `*` in public
    /// mode and nothing in credentialed mode.
    #[arg(long, env = "BADGESMITH_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Switch CORS into credentialed mode (exact origin echo).
    #[arg(long, env = "BADGESMITH_CORS_CREDENTIALED")]
    pub cors_credentialed: bool,
}

impl Config {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    pub fn auth_skew(&self) -> Duration {
        Duration::from_secs(self.auth_skew_secs)
    }

    pub fn nonce_ttl(&self) -> Duration {
        Duration::from_secs(self.nonce_ttl_secs)
    }

    pub fn run_marker_ttl(&self) -> Duration {
        Duration::from_secs(self.run_marker_ttl_secs)
    }

    pub fn upstream(&self) -> UpstreamConfig {
        UpstreamConfig {
            timeout: Duration::from_secs(self.upstream_timeout_secs),
            concurrency: self.upstream_concurrency,
            breaker: BreakerConfig {
                failure_threshold: self.breaker_failure_threshold,
                cooldown: Duration::from_secs(self.breaker_cooldown_secs),
            },
            ..UpstreamConfig::default()
        }
    }

    pub fn cors(&self) -> CorsPolicy {
        let mode = if self.cors_credentialed {
            CorsMode::Credentialed
        } else {
            CorsMode::Public
        };
        CorsPolicy::new(mode, self.cors_origins.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_arguments() {
        let config = Config::try_parse_from(["badgesmith"]).unwrap();
        assert_eq!(config.upstream_timeout_secs, 10);
        assert_eq!(config.auth_skew_secs, 300);
        assert_eq!(config.nonce_ttl_secs, 2_700);
        assert!(!config.cors_credentialed);
    }

    #[test]
    fn origins_split_on_commas() {
        let config = Config::try_parse_from([
            "badgesmith",
            "--cors-origins",
            "https://a.example,https://b.example",
        ])
        .unwrap();
        assert_eq!(config.cors_origins.len(), 2);
    }
}
