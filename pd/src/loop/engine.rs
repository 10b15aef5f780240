//! Scheduler loop engine
//!
//! One `tick` is a full scheduling pass: window check, quota upkeep, daily
//! replan, then the lock-guarded due-slot scan. `run` drives ticks on a
//! fixed interval until shutdown. No tick error terminates the loop; a
//! failed pass is logged and the next interval tries again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use eyre::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use watchstore::{KvStore, StoreLock};

use crate::calendar::WeeklyCalendar;
use crate::pipeline::{ContentPipeline, PipelineOutcome};
use crate::planner::plan_day;
use crate::state::{PlannedSlot, QuotaStore, Reservation, ScheduleStore};
use crate::transport::Publisher;

/// Engine settings; see [`crate::config::Config`] for the file-level
/// counterparts
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Items allowed per rolling 24h cycle
    pub daily_limit: u32,
    /// Time between scheduling passes
    pub tick_interval: Duration,
    /// How far from its planned instant a slot may still execute
    pub tolerance: Duration,
    /// Civil timezone for all weekday/hour decisions
    pub timezone: Tz,
    /// Prefix applied to every store key
    pub key_prefix: String,
    /// TTL on the cross-instance scan lock
    pub lock_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            daily_limit: 17,
            tick_interval: Duration::from_secs(60),
            tolerance: Duration::from_secs(5 * 60),
            timezone: chrono_tz::America::New_York,
            key_prefix: "postdaemon:".to_string(),
            lock_ttl: Duration::from_secs(10),
        }
    }
}

/// Drives the posting schedule against the shared store
pub struct Engine {
    config: EngineConfig,
    calendar: WeeklyCalendar,
    quota: QuotaStore,
    schedule: ScheduleStore,
    lock: StoreLock,
    pipeline: Arc<dyn ContentPipeline>,
    transport: Arc<dyn Publisher>,
    rng: StdRng,
    /// Calendar day of the last successful replan. None until the first
    /// replan, so a restart mid-day replans with whatever quota is left.
    last_planned: Option<NaiveDate>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        calendar: WeeklyCalendar,
        store: Arc<dyn KvStore>,
        pipeline: Arc<dyn ContentPipeline>,
        transport: Arc<dyn Publisher>,
    ) -> Self {
        let quota = QuotaStore::new(store.clone(), &config.key_prefix, config.daily_limit);
        let schedule = ScheduleStore::new(store.clone(), &config.key_prefix);
        let lock = StoreLock::new(
            store,
            format!("{}scan_lock", config.key_prefix),
            config.lock_ttl,
        );
        Self {
            config,
            calendar,
            quota,
            schedule,
            lock,
            pipeline,
            transport,
            rng: StdRng::from_os_rng(),
            last_planned: None,
        }
    }

    /// Seed the planner's randomness; tests use this for exact output
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Ensure the quota exists in the store; idempotent
    pub async fn initialize(&self) -> Result<()> {
        self.quota.initialize_if_absent(Utc::now()).await
    }

    /// Drive scheduling passes until the shutdown channel fires
    pub async fn run(&mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!(
            interval_secs = self.config.tick_interval.as_secs(),
            timezone = %self.config.timezone,
            daily_limit = self.config.daily_limit,
            "scheduler loop starting"
        );
        let mut interval = tokio::time::interval(self.config.tick_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Utc::now().with_timezone(&self.config.timezone);
                    if let Err(e) = self.tick(now).await {
                        warn!(error = %e, "tick failed, skipping");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// One scheduling pass at civil time `now`
    pub async fn tick(&mut self, now: DateTime<Tz>) -> Result<()> {
        if !self.calendar.for_weekday(now.weekday()).is_active(now.hour()) {
            // Outside every posting window: nothing to do, no store access.
            return Ok(());
        }

        if self.quota.check_and_reset(now.with_timezone(&Utc)).await? {
            info!("daily quota reset");
        }

        self.replan_if_new_day(now).await?;
        self.scan_under_lock(now).await
    }

    /// Rebuild and persist the day's plan when the calendar day changes
    async fn replan_if_new_day(&mut self, now: DateTime<Tz>) -> Result<()> {
        let today = now.date_naive();
        if self.last_planned == Some(today) {
            return Ok(());
        }

        let remaining = self.quota.remaining().await?;
        let distributions = plan_day(
            remaining,
            self.calendar.for_weekday(now.weekday()),
            today,
            self.config.timezone,
            &mut self.rng,
        );
        let mut slots: Vec<PlannedSlot> = distributions
            .iter()
            .flat_map(|d| d.times.iter().map(|t| PlannedSlot::new(t.with_timezone(&Utc))))
            .collect();
        slots.sort_by_key(|s| s.post_time);

        self.schedule.set(&slots).await?;
        self.last_planned = Some(today);
        info!(%today, remaining, slots = slots.len(), "planned today's schedule");
        Ok(())
    }

    /// Run the due-slot scan while holding the cross-instance lock
    ///
    /// Two instances scanning at once could both publish the same slot
    /// before either persists it as executed, so the scan is serialized
    /// through the store lock. Contention just means the other instance
    /// covers this tick.
    async fn scan_under_lock(&mut self, now: DateTime<Tz>) -> Result<()> {
        if !self.lock.acquire().await? {
            debug!("scan lock held elsewhere, skipping scan");
            return Ok(());
        }

        let result = self.scan_due_slots(now).await;
        if let Err(e) = self.lock.release().await {
            warn!(error = %e, "failed to release scan lock; TTL will reclaim it");
        }
        result
    }

    /// Execute every unexecuted slot within tolerance of `now`
    ///
    /// Slots further in the future wait for a later tick. Slots further in
    /// the past have missed their window and are never retried.
    async fn scan_due_slots(&mut self, now: DateTime<Tz>) -> Result<()> {
        let Some(mut slots) = self.schedule.get().await? else {
            return Ok(());
        };

        let now_utc = now.with_timezone(&Utc);
        let tolerance = self.config.tolerance.as_secs() as i64;

        for index in 0..slots.len() {
            let slot = slots[index];
            if slot.executed {
                continue;
            }
            let offset = (now_utc - slot.post_time).num_seconds();
            if offset.abs() > tolerance {
                continue;
            }

            if self.execute_slot(now).await? {
                slots[index].executed = true;
                self.schedule.set(&slots).await?;
            }
        }

        Ok(())
    }

    /// Publish one slot's batch end to end. True when the whole batch went
    /// out and the slot should be marked executed.
    async fn execute_slot(&mut self, now: DateTime<Tz>) -> Result<bool> {
        let items = match self.pipeline.produce().await {
            Ok(PipelineOutcome::Batch(items)) if !items.is_empty() => items,
            Ok(PipelineOutcome::Batch(_)) | Ok(PipelineOutcome::Rerun) => {
                debug!("pipeline has nothing to publish this cycle");
                return Ok(false);
            }
            Err(e) => {
                warn!(error = %e, "content pipeline failed, leaving slot for retry");
                return Ok(false);
            }
        };

        match self.quota.reserve(items.len() as u32).await? {
            Reservation::Insufficient => {
                debug!(requested = items.len(), "quota exhausted, leaving slot unexecuted");
                return Ok(false);
            }
            Reservation::Reserved => {}
        }

        // Thread the batch: each item replies to the one before it. A
        // failure aborts the rest of the batch; quota reserved for unsent
        // items is forfeited rather than refunded.
        let mut reply_to: Option<String> = None;
        for (position, text) in items.iter().enumerate() {
            match self.transport.publish(text, reply_to.as_deref()).await {
                Ok(id) => reply_to = Some(id),
                Err(e) => {
                    warn!(position, error = %e, "publish failed, aborting batch");
                    return Ok(false);
                }
            }
        }

        if let Err(e) = self.quota.record_usage(items.len() as u32, now.date_naive()).await {
            warn!(error = %e, "failed to record usage stats");
        }
        info!(items = items.len(), "published batch");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{DailySchedule, PostingWindow};
    use crate::pipeline::mock::MockPipeline;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use watchstore::MemoryStore;

    /// Publisher that records calls; never fails
    struct RecordingPublisher {
        published: Mutex<Vec<(String, Option<String>)>>,
    }

    impl RecordingPublisher {
        fn new() -> Self {
            Self {
                published: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, text: &str, reply_to: Option<&str>) -> Result<String> {
            let mut published = self.published.lock().unwrap();
            published.push((text.to_string(), reply_to.map(str::to_string)));
            Ok(format!("id-{}", published.len()))
        }
    }

    const TZ: Tz = chrono_tz::America::New_York;

    fn tuesday_nine_am() -> DateTime<Tz> {
        // 2024-01-09 is a Tuesday.
        TZ.with_ymd_and_hms(2024, 1, 9, 9, 2, 0).unwrap()
    }

    fn tuesday_calendar() -> WeeklyCalendar {
        let mut calendar = WeeklyCalendar::empty();
        calendar.tuesday = DailySchedule::new(vec![PostingWindow::new(9, 17)]);
        calendar
    }

    #[tokio::test]
    async fn test_inactive_hour_skips_without_store_access() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(MockPipeline::batch(&["hello"]));
        let mut engine = Engine::new(
            EngineConfig::default(),
            WeeklyCalendar::empty(),
            store.clone(),
            pipeline.clone(),
            Arc::new(RecordingPublisher::new()),
        );

        engine.tick(tuesday_nine_am()).await.unwrap();

        assert_eq!(pipeline.call_count(), 0);
        assert_eq!(store.get("postdaemon:daily_quota").await.unwrap(), None);
        assert_eq!(store.get("postdaemon:current_schedule").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_first_active_tick_resets_quota_and_plans_the_day() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut engine = Engine::new(
            EngineConfig::default(),
            tuesday_calendar(),
            store.clone(),
            Arc::new(MockPipeline::new(vec![])),
            Arc::new(RecordingPublisher::new()),
        )
        .with_rng_seed(7);

        engine.tick(tuesday_nine_am()).await.unwrap();

        // Quota was absent, so upkeep reset it to the limit; the plan spent
        // none of it yet.
        assert_eq!(
            store.get("postdaemon:daily_quota").await.unwrap().as_deref(),
            Some("17")
        );
        let schedule = ScheduleStore::new(store.clone(), "postdaemon:");
        let slots = schedule.get().await.unwrap().unwrap();
        // 17 over a 9-hour window rounds to 17 slots.
        assert_eq!(slots.len(), 17);
        assert!(slots.iter().all(|s| !s.executed));
        for pair in slots.windows(2) {
            assert!(pair[0].post_time <= pair[1].post_time);
        }
    }

    #[tokio::test]
    async fn test_replan_happens_once_per_day() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let mut engine = Engine::new(
            EngineConfig::default(),
            tuesday_calendar(),
            store.clone(),
            Arc::new(MockPipeline::new(vec![])),
            Arc::new(RecordingPublisher::new()),
        )
        .with_rng_seed(7);

        engine.tick(tuesday_nine_am()).await.unwrap();
        let schedule = ScheduleStore::new(store.clone(), "postdaemon:");
        let first = schedule.get().await.unwrap().unwrap();

        engine.tick(tuesday_nine_am() + chrono::Duration::minutes(30)).await.unwrap();
        let second = schedule.get().await.unwrap().unwrap();

        assert_eq!(first, second);
    }

    /// Run the first tick of the day with zero quota so the plan comes out
    /// empty, then hand back an engine whose replan is already done. Tests
    /// then seed the schedule and quota directly.
    async fn prepared_engine(
        store: &Arc<dyn KvStore>,
        pipeline: Arc<MockPipeline>,
        publisher: Arc<RecordingPublisher>,
        now: DateTime<Tz>,
        quota: u32,
    ) -> Engine {
        store
            .set(
                "postdaemon:last_reset",
                &now.with_timezone(&Utc).timestamp().to_string(),
                None,
            )
            .await
            .unwrap();
        store.set("postdaemon:daily_quota", "0", None).await.unwrap();

        let mut engine = Engine::new(
            EngineConfig::default(),
            tuesday_calendar(),
            store.clone(),
            pipeline,
            publisher,
        )
        .with_rng_seed(7);
        engine.tick(now).await.unwrap();

        store
            .set("postdaemon:daily_quota", &quota.to_string(), None)
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_scan_skips_while_lock_is_held() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(MockPipeline::batch(&["hello"]));
        let publisher = Arc::new(RecordingPublisher::new());
        let now = tuesday_nine_am();
        let mut engine = prepared_engine(&store, pipeline.clone(), publisher, now, 5).await;

        let schedule = ScheduleStore::new(store.clone(), "postdaemon:");
        schedule
            .set(&[PlannedSlot::new(now.with_timezone(&Utc))])
            .await
            .unwrap();

        // Another instance holds the lock: the due slot must not execute.
        let foreign_lock = StoreLock::new(
            store.clone(),
            "postdaemon:scan_lock",
            Duration::from_secs(10),
        );
        assert!(foreign_lock.acquire().await.unwrap());
        engine.tick(now + chrono::Duration::minutes(1)).await.unwrap();
        assert_eq!(pipeline.call_count(), 0);

        // Released, the next tick picks it up.
        foreign_lock.release().await.unwrap();
        engine.tick(now + chrono::Duration::minutes(2)).await.unwrap();
        assert_eq!(pipeline.call_count(), 1);
    }
}
