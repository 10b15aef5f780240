//! Store trait and optimistic transaction primitives
//!
//! Plain operations (`get`, `set`, `incr_by`, ...) have last-write-wins
//! semantics. Mutations that must be atomic with respect to concurrent
//! writers use `watch_read`/`commit`: take a snapshot of the watched keys,
//! compute the writes from it, and apply them only if none of the watched
//! keys changed in between. [`transact`] owns the bounded retry loop around
//! that cycle.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::StoreError;

/// Upper bound on optimistic transaction attempts before the conflict is
/// surfaced to the caller.
pub const MAX_TXN_ATTEMPTS: u32 = 3;

/// A single write queued into a conditional commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Set a key, optionally with a time-to-live
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    /// Delete a key
    Del { key: String },
}

impl WriteOp {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
            ttl: None,
        }
    }

    pub fn set_ex(key: impl Into<String>, value: impl Into<String>, ttl: Duration) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
            ttl: Some(ttl),
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Self::Del { key: key.into() }
    }
}

/// Snapshot of watched keys taken by [`KvStore::watch_read`]
///
/// `commit` re-validates every entry against the live store, so a snapshot is
/// only good for one commit attempt.
#[derive(Debug, Clone)]
pub struct Watched {
    pub(crate) entries: Vec<WatchedKey>,
}

#[derive(Debug, Clone)]
pub(crate) struct WatchedKey {
    pub(crate) key: String,
    pub(crate) value: Option<String>,
    /// Backend-private change counter. The in-memory backend validates
    /// against it; the Redis backend compares values instead and leaves it
    /// at zero.
    pub(crate) version: u64,
}

impl Watched {
    /// Value of a watched key at snapshot time
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .and_then(|e| e.value.as_deref())
    }
}

/// Outcome of a conditional commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All writes applied atomically
    Committed,
    /// A watched key changed since the snapshot; nothing was written
    Conflict,
}

/// Decision returned by a transaction body
pub enum TxnDecision<T> {
    /// Apply the writes; [`transact`] returns the value once they commit
    Commit(Vec<WriteOp>, T),
    /// Nothing to write; [`transact`] returns the value immediately
    Abort(T),
}

/// Shared transactional key-value store
///
/// Implementations must make `commit` atomic with respect to concurrent
/// commits touching the same keys.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Increment an integer value, creating it at zero if absent. Returns
    /// the new value.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Set a time-to-live on an existing key; false if the key is absent
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Set only if the key is absent; true if this call set it
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Snapshot the given keys for a later conditional commit
    async fn watch_read(&self, keys: &[&str]) -> Result<Watched, StoreError>;

    /// Apply `writes` iff no watched key changed since the snapshot
    async fn commit(&self, watched: &Watched, writes: Vec<WriteOp>)
    -> Result<CommitOutcome, StoreError>;
}

/// Run one read-watch/compute/conditional-commit cycle with bounded retries.
///
/// `body` sees a fresh snapshot on every attempt and decides whether to
/// commit writes or abort with a result. A conflicted commit retries up to
/// [`MAX_TXN_ATTEMPTS`] times and then surfaces
/// [`StoreError::RetriesExhausted`].
pub async fn transact<T, F>(store: &dyn KvStore, keys: &[&str], mut body: F) -> Result<T, StoreError>
where
    F: FnMut(&Watched) -> TxnDecision<T>,
{
    for attempt in 1..=MAX_TXN_ATTEMPTS {
        let watched = store.watch_read(keys).await?;
        match body(&watched) {
            TxnDecision::Abort(value) => return Ok(value),
            TxnDecision::Commit(writes, value) => match store.commit(&watched, writes).await? {
                CommitOutcome::Committed => return Ok(value),
                CommitOutcome::Conflict => {
                    debug!(attempt, ?keys, "transact: commit conflicted, retrying");
                }
            },
        }
    }

    Err(StoreError::RetriesExhausted {
        attempts: MAX_TXN_ATTEMPTS,
    })
}
