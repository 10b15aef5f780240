//! In-memory store backend
//!
//! Single-process stand-in for Redis used by tests and local development.
//! Commits validate per-key change counters, so concurrent writers observe
//! the same conflict semantics the Redis backend provides.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{CommitOutcome, KvStore, Watched, WatchedKey, WriteOp};

#[derive(Debug)]
struct Entry {
    value: String,
    version: u64,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    /// Monotonic mutation counter. Versions come from it, so a key that is
    /// deleted and re-created never reuses an old version.
    clock: u64,
}

impl Inner {
    fn live(&self, key: &str) -> Option<&Entry> {
        self.entries
            .get(key)
            .filter(|e| e.expires_at.is_none_or(|t| Instant::now() < t))
    }

    fn version_of(&self, key: &str) -> u64 {
        self.live(key).map(|e| e.version).unwrap_or(0)
    }

    fn put(&mut self, key: &str, value: String, ttl: Option<Duration>) {
        self.clock += 1;
        let entry = Entry {
            value,
            version: self.clock,
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries.insert(key.to_string(), entry);
    }

    fn remove(&mut self, key: &str) {
        self.clock += 1;
        self.entries.remove(key);
    }
}

/// In-memory [`KvStore`] with versioned optimistic commits
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.live(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.put(key, value.to_string(), ttl);
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        let current: i64 = inner
            .live(key)
            .and_then(|e| e.value.parse().ok())
            .unwrap_or(0);
        let next = current + delta;
        // INCRBY keeps whatever expiry the key already carries.
        let expires_at = inner.live(key).and_then(|e| e.expires_at);
        inner.clock += 1;
        let entry = Entry {
            value: next.to_string(),
            version: inner.clock,
            expires_at,
        };
        inner.entries.insert(key.to_string(), entry);
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.live(key).is_none() {
            return Ok(false);
        }
        inner.clock += 1;
        let version = inner.clock;
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
            entry.version = version;
        }
        Ok(true)
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.live(key).is_some() {
            return Ok(false);
        }
        inner.put(key, value.to_string(), Some(ttl));
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.remove(key);
        Ok(())
    }

    async fn watch_read(&self, keys: &[&str]) -> Result<Watched, StoreError> {
        let inner = self.inner.lock().await;
        let entries = keys
            .iter()
            .map(|key| WatchedKey {
                key: (*key).to_string(),
                value: inner.live(key).map(|e| e.value.clone()),
                version: inner.version_of(key),
            })
            .collect();
        Ok(Watched { entries })
    }

    async fn commit(
        &self,
        watched: &Watched,
        writes: Vec<WriteOp>,
    ) -> Result<CommitOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        for entry in &watched.entries {
            if inner.version_of(&entry.key) != entry.version {
                return Ok(CommitOutcome::Conflict);
            }
        }
        for op in writes {
            match op {
                WriteOp::Set { key, value, ttl } => inner.put(&key, value, ttl),
                WriteOp::Del { key } => inner.remove(&key),
            }
        }
        Ok(CommitOutcome::Committed)
    }
}
