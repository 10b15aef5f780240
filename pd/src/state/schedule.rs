//! Persisted day schedule
//!
//! The whole day's slot list is stored as one JSON blob and replaced at the
//! next replan. Absence is a normal state: no plan has been computed yet.
//! There is no implicit expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use watchstore::{KvStore, TxnDecision, WriteOp, transact};

/// One planned publish instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSlot {
    pub post_time: DateTime<Utc>,
    pub executed: bool,
}

impl PlannedSlot {
    pub fn new(post_time: DateTime<Utc>) -> Self {
        Self {
            post_time,
            executed: false,
        }
    }
}

pub struct ScheduleStore {
    store: Arc<dyn KvStore>,
    key: String,
}

impl ScheduleStore {
    pub fn new(store: Arc<dyn KvStore>, key_prefix: &str) -> Self {
        Self {
            store,
            key: format!("{key_prefix}current_schedule"),
        }
    }

    /// The current day's plan, if one has been persisted
    pub async fn get(&self) -> Result<Option<Vec<PlannedSlot>>> {
        match self
            .store
            .get(&self.key)
            .await
            .context("failed to read schedule")?
        {
            Some(json) => {
                let slots = serde_json::from_str(&json).context("failed to decode schedule")?;
                Ok(Some(slots))
            }
            None => Ok(None),
        }
    }

    /// Replace the persisted plan
    pub async fn set(&self, slots: &[PlannedSlot]) -> Result<()> {
        let json = serde_json::to_string(slots).context("failed to encode schedule")?;
        transact(self.store.as_ref(), &[&self.key], |_| {
            TxnDecision::Commit(vec![WriteOp::set(&self.key, json.clone())], ())
        })
        .await
        .context("failed to persist schedule")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use watchstore::MemoryStore;

    fn schedule_store() -> ScheduleStore {
        ScheduleStore::new(Arc::new(MemoryStore::new()), "test:")
    }

    #[tokio::test]
    async fn test_absent_schedule_is_none() {
        let schedule = schedule_store();
        assert!(schedule.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_replaces_prior_plan() {
        let schedule = schedule_store();
        let t = Utc.with_ymd_and_hms(2024, 1, 9, 9, 30, 0).unwrap();

        schedule
            .set(&[PlannedSlot::new(t), PlannedSlot::new(t + chrono::Duration::hours(1))])
            .await
            .unwrap();
        assert_eq!(schedule.get().await.unwrap().unwrap().len(), 2);

        schedule.set(&[PlannedSlot::new(t)]).await.unwrap();
        let slots = schedule.get().await.unwrap().unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].post_time, t);
        assert!(!slots[0].executed);
    }

    #[tokio::test]
    async fn test_executed_flag_survives_persistence() {
        let schedule = schedule_store();
        let t = Utc.with_ymd_and_hms(2024, 1, 9, 9, 30, 0).unwrap();

        let mut slots = vec![PlannedSlot::new(t)];
        slots[0].executed = true;
        schedule.set(&slots).await.unwrap();

        assert!(schedule.get().await.unwrap().unwrap()[0].executed);
    }
}
