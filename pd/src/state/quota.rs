//! Daily posting quota
//!
//! A single counter plus a last-reset instant under well-known keys. The
//! counter only moves through compare-and-commit transactions, so concurrent
//! instances can never overdraw it; a reservation that finds too little
//! quota is a normal outcome, not an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use eyre::{Context, Result};
use tracing::{debug, info};
use watchstore::{KvStore, TxnDecision, WriteOp, transact};

/// Rolling window between automatic quota resets
const RESET_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// How long per-day usage counters are retained
const USAGE_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Outcome of a reservation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// Quota decremented; the caller may publish
    Reserved,
    /// Not enough quota left
    Insufficient,
}

pub struct QuotaStore {
    store: Arc<dyn KvStore>,
    daily_limit: u32,
    quota_key: String,
    reset_key: String,
    usage_prefix: String,
}

impl QuotaStore {
    pub fn new(store: Arc<dyn KvStore>, key_prefix: &str, daily_limit: u32) -> Self {
        Self {
            store,
            daily_limit,
            quota_key: format!("{key_prefix}daily_quota"),
            reset_key: format!("{key_prefix}last_reset"),
            usage_prefix: format!("{key_prefix}usage_stats:"),
        }
    }

    /// Ensure the quota exists; called once at startup, safe to repeat
    pub async fn initialize_if_absent(&self, now: DateTime<Utc>) -> Result<()> {
        let existing = self
            .store
            .get(&self.quota_key)
            .await
            .context("failed to check quota existence")?;
        if existing.is_none() {
            info!(limit = self.daily_limit, "initializing daily quota");
            self.reset(now).await?;
        }
        Ok(())
    }

    /// Set the quota back to the daily limit and stamp the reset instant,
    /// committed together
    pub async fn reset(&self, now: DateTime<Utc>) -> Result<()> {
        let writes = self.reset_writes(now);
        transact(
            self.store.as_ref(),
            &[&self.quota_key, &self.reset_key],
            |_| TxnDecision::Commit(writes.clone(), ()),
        )
        .await
        .context("failed to reset quota")
    }

    /// Reset iff the last reset is absent or at least 24h old. The check and
    /// the write share one transaction, so racing instances reset exactly
    /// once per cycle. Returns true if this call performed the reset.
    pub async fn check_and_reset(&self, now: DateTime<Utc>) -> Result<bool> {
        transact(
            self.store.as_ref(),
            &[&self.quota_key, &self.reset_key],
            |watched| {
                // An unparseable stamp is treated like a missing one.
                let stale = match watched
                    .get(&self.reset_key)
                    .and_then(|v| v.parse::<i64>().ok())
                {
                    None => true,
                    Some(last) => now.timestamp() - last >= RESET_INTERVAL.as_secs() as i64,
                };
                if stale {
                    TxnDecision::Commit(self.reset_writes(now), true)
                } else {
                    TxnDecision::Abort(false)
                }
            },
        )
        .await
        .context("failed to check quota staleness")
    }

    /// Atomically take `count` from the quota
    pub async fn reserve(&self, count: u32) -> Result<Reservation> {
        let outcome = transact(self.store.as_ref(), &[&self.quota_key], |watched| {
            let remaining: i64 = watched
                .get(&self.quota_key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            if remaining < i64::from(count) {
                TxnDecision::Abort(Reservation::Insufficient)
            } else {
                TxnDecision::Commit(
                    vec![WriteOp::set(
                        &self.quota_key,
                        (remaining - i64::from(count)).to_string(),
                    )],
                    Reservation::Reserved,
                )
            }
        })
        .await
        .context("failed to reserve capacity")?;
        debug!(count, ?outcome, "quota reservation");
        Ok(outcome)
    }

    /// Remaining quota right now; an absent counter reads as zero
    pub async fn remaining(&self) -> Result<u32> {
        let value = self
            .store
            .get(&self.quota_key)
            .await
            .context("failed to read quota")?;
        let remaining: i64 = value.and_then(|v| v.parse().ok()).unwrap_or(0);
        Ok(remaining.max(0) as u32)
    }

    /// Bump the usage counter for `date`, retained for 30 days
    pub async fn record_usage(&self, count: u32, date: NaiveDate) -> Result<()> {
        let key = format!("{}{}", self.usage_prefix, date.format("%Y-%m-%d"));
        self.store
            .incr_by(&key, i64::from(count))
            .await
            .context("failed to update usage stats")?;
        self.store
            .expire(&key, USAGE_RETENTION)
            .await
            .context("failed to set stats expiration")?;
        Ok(())
    }

    fn reset_writes(&self, now: DateTime<Utc>) -> Vec<WriteOp> {
        vec![
            WriteOp::set_ex(&self.quota_key, self.daily_limit.to_string(), RESET_INTERVAL),
            WriteOp::set_ex(&self.reset_key, now.timestamp().to_string(), RESET_INTERVAL),
        ]
    }
}
