//! Redis store backend
//!
//! Plain operations run on a shared multiplexed connection. WATCH state is
//! per-connection, so every `commit` opens a dedicated connection: it
//! re-checks the snapshot values under WATCH and EXECs the write batch only
//! if they still match. Either the value comparison or a nil EXEC reply
//! reports the conflict.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{CommitOutcome, KvStore, Watched, WatchedKey, WriteOp};

/// [`KvStore`] backed by a shared Redis instance
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisStore {
    /// Connect and verify the server is reachable
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        info!(%url, "connecting to redis");
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client.clone()).await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.incr(key, delta).await?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.expire(key, ttl.as_secs() as i64).await?)
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn watch_read(&self, keys: &[&str]) -> Result<Watched, StoreError> {
        let mut conn = self.conn.clone();
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let value: Option<String> = conn.get(*key).await?;
            entries.push(WatchedKey {
                key: (*key).to_string(),
                value,
                version: 0,
            });
        }
        Ok(Watched { entries })
    }

    async fn commit(
        &self,
        watched: &Watched,
        writes: Vec<WriteOp>,
    ) -> Result<CommitOutcome, StoreError> {
        // Dedicated connection: WATCH must not leak onto the shared one.
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let keys: Vec<&str> = watched.entries.iter().map(|e| e.key.as_str()).collect();
        redis::cmd("WATCH").arg(&keys).query_async::<()>(&mut conn).await?;

        for entry in &watched.entries {
            let current: Option<String> = conn.get(&entry.key).await?;
            if current.as_deref() != entry.value.as_deref() {
                debug!(key = %entry.key, "commit: watched key changed since snapshot");
                redis::cmd("UNWATCH").query_async::<()>(&mut conn).await?;
                return Ok(CommitOutcome::Conflict);
            }
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &writes {
            match op {
                WriteOp::Set {
                    key,
                    value,
                    ttl: Some(ttl),
                } => {
                    pipe.cmd("SET").arg(key).arg(value).arg("EX").arg(ttl.as_secs()).ignore();
                }
                WriteOp::Set { key, value, ttl: None } => {
                    pipe.cmd("SET").arg(key).arg(value).ignore();
                }
                WriteOp::Del { key } => {
                    pipe.cmd("DEL").arg(key).ignore();
                }
            }
        }

        // A nil EXEC reply means a watched key was touched mid-flight.
        let exec: Option<()> = pipe.query_async(&mut conn).await?;
        Ok(match exec {
            Some(()) => CommitOutcome::Committed,
            None => CommitOutcome::Conflict,
        })
    }
}
