//! Cross-instance mutual exclusion
//!
//! Advisory lock backed by the shared store. `acquire` wins iff the key is
//! absent; the TTL bounds how long a crashed holder can wedge everyone else.
//! `release` deletes the key unconditionally, so hold times must stay well
//! under the TTL.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::StoreError;
use crate::store::KvStore;

#[derive(Clone)]
pub struct StoreLock {
    store: Arc<dyn KvStore>,
    key: String,
    ttl: Duration,
}

impl StoreLock {
    pub fn new(store: Arc<dyn KvStore>, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
        }
    }

    /// True if this caller now holds the lock
    pub async fn acquire(&self) -> Result<bool, StoreError> {
        let acquired = self.store.set_nx(&self.key, "locked", self.ttl).await?;
        debug!(key = %self.key, acquired, "lock acquire");
        Ok(acquired)
    }

    pub async fn release(&self) -> Result<(), StoreError> {
        debug!(key = %self.key, "lock release");
        self.store.del(&self.key).await
    }
}

impl std::fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLock")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .finish()
    }
}
