//! TTL-bounded "seen nonce" store with first-writer-wins reservation.
//!
//! A nonce may be accepted at most once within its TTL. Reservation happens
//! with conditional-create semantics: the first caller wins, every other
//! caller within the window loses, and an expired record may be reclaimed by
//! a later reservation.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::store::StoreError;

/// One reserved nonce, kept until `expires_at`.
#[derive(Debug, Clone)]
pub struct NonceRecord {
    pub nonce: String,
    pub repo: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Interface to the anti-replay store.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Atomically reserves `nonce` for `repo`.
    ///
    /// Returns true iff the nonce was absent (or expired) and is now
    /// reserved. Errors mean the store could not decide; callers must fail
    /// closed.
    async fn try_reserve(
        &self,
        nonce: &str,
        repo: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Whether `nonce` currently holds a live reservation.
    async fn is_reserved(&self, nonce: &str) -> Result<bool, StoreError>;
}

/// In-process nonce store on a concurrent map with TTL records.
#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    entries: DashMap<String, NonceRecord>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired reservations; the janitor task calls this periodically.
    pub fn purge_expired(&self) {
        let now = Utc::now();
        self.entries.retain(|_, record| record.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn try_reserve(
        &self,
        nonce: &str,
        repo: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let record = NonceRecord {
            nonce: nonce.to_string(),
            repo: repo.to_string(),
            created_at: now,
            expires_at: now + ttl,
        };
        // The map entry holds the shard lock, which makes the
        // check-then-insert a single atomic step.
        match self.entries.entry(nonce.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return Ok(false);
                }
                occupied.insert(record);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(true)
            }
        }
    }

    async fn is_reserved(&self, nonce: &str) -> Result<bool, StoreError> {
        let now = Utc::now();
        Ok(self
            .entries
            .get(nonce)
            .map(|record| record.expires_at > now)
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(2700);

    #[tokio::test]
    async fn first_reservation_wins() {
        let store = MemoryNonceStore::new();
        assert!(store.try_reserve("n1", "acme/widget", TTL).await.unwrap());
        assert!(!store.try_reserve("n1", "acme/widget", TTL).await.unwrap());
        assert!(!store.try_reserve("n1", "other/repo", TTL).await.unwrap());
        assert!(store.is_reserved("n1").await.unwrap());
    }

    #[tokio::test]
    async fn distinct_nonces_are_independent() {
        let store = MemoryNonceStore::new();
        assert!(store.try_reserve("n1", "acme/widget", TTL).await.unwrap());
        assert!(store.try_reserve("n2", "acme/widget", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn expired_reservations_can_be_reclaimed() {
        let store = MemoryNonceStore::new();
        assert!(store
            .try_reserve("n1", "acme/widget", Duration::from_millis(0))
            .await
            .unwrap());
        assert!(!store.is_reserved("n1").await.unwrap());
        assert!(store.try_reserve("n1", "acme/widget", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_reservations_accept_exactly_one() {
        let store = std::sync::Arc::new(MemoryNonceStore::new());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.try_reserve("n1", "acme/widget", TTL).await.unwrap()
            }));
        }
        let mut accepted = 0;
        for task in tasks {
            if task.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn purge_drops_only_expired_records() {
        let store = MemoryNonceStore::new();
        store
            .try_reserve("dead", "acme/widget", Duration::from_millis(0))
            .await
            .unwrap();
        store.try_reserve("live", "acme/widget", TTL).await.unwrap();
        store.purge_expired();
        assert_eq!(store.len(), 1);
        assert!(store.is_reserved("live").await.unwrap());
    }
}
