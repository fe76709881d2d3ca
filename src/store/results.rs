//! Durable test-result store with idempotent, run-scoped writes.
//!
//! A write inserts two logical items: a short-lived "run seen" marker keyed
//! by `(owner, repo, run_id)` (conditional on absence, so retries and
//! replays collapse into `Duplicate`) and the result item itself, indexed so
//! the latest result per `(owner, repo, platform, branch)` is a single
//! lookup. Result items are retained indefinitely; markers expire.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// CI platform a test run executed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Windows,
    Macos,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Macos => "macos",
        }
    }
}

impl FromStr for Platform {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            "macos" => Ok(Self::Macos),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted test-result ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResultRecord {
    pub owner: String,
    pub repo: String,
    pub platform: Platform,
    pub branch: String,
    pub run_id: String,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total: u32,
    pub run_url: String,
    pub commit: String,
    pub timestamp_epoch: i64,
}

/// Outcome of an ingestion write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Accepted,
    Duplicate,
}

/// Interface to the test-result store.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Idempotent write: `Duplicate` when the run id was already accepted
    /// for this `(owner, repo)` within the marker TTL.
    async fn put(
        &self,
        record: TestResultRecord,
        marker_ttl: Duration,
    ) -> Result<PutOutcome, StoreError>;

    /// Latest result for the key, by ingestion timestamp descending.
    async fn get_latest(
        &self,
        owner: &str,
        repo: &str,
        platform: Platform,
        branch: &str,
    ) -> Result<Option<TestResultRecord>, StoreError>;
}

/// In-process result store mirroring the KV layout.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    /// `RUN#<owner>#<repo>#<run_id>` → marker expiry.
    runs_seen: DashMap<String, Instant>,
    /// `TEST#<owner>#<repo>#<platform>#<branch>` → result items.
    items: DashMap<String, Vec<TestResultRecord>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired run markers; result items are retained indefinitely.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.runs_seen.retain(|_, expires| *expires > now);
    }
}

fn run_key(owner: &str, repo: &str, run_id: &str) -> String {
    format!("RUN#{owner}#{repo}#{run_id}")
}

fn result_key(owner: &str, repo: &str, platform: Platform, branch: &str) -> String {
    format!("TEST#{owner}#{repo}#{platform}#{branch}")
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn put(
        &self,
        record: TestResultRecord,
        marker_ttl: Duration,
    ) -> Result<PutOutcome, StoreError> {
        let now = Instant::now();
        match self
            .runs_seen
            .entry(run_key(&record.owner, &record.repo, &record.run_id))
        {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    return Ok(PutOutcome::Duplicate);
                }
                occupied.insert(now + marker_ttl);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now + marker_ttl);
            }
        }

        let key = result_key(
            &record.owner,
            &record.repo,
            record.platform,
            &record.branch,
        );
        self.items.entry(key).or_default().push(record);
        Ok(PutOutcome::Accepted)
    }

    async fn get_latest(
        &self,
        owner: &str,
        repo: &str,
        platform: Platform,
        branch: &str,
    ) -> Result<Option<TestResultRecord>, StoreError> {
        let key = result_key(owner, repo, platform, branch);
        Ok(self.items.get(&key).and_then(|items| {
            items
                .iter()
                .max_by(|a, b| {
                    a.timestamp_epoch
                        .cmp(&b.timestamp_epoch)
                        .then_with(|| a.run_id.cmp(&b.run_id))
                })
                .cloned()
        }))
    }
}
