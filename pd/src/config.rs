//! Configuration types and loading

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};

use crate::calendar::WeeklyCalendar;
use crate::r#loop::EngineConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Posting windows; defaults to the built-in table
    #[serde(default)]
    pub calendar: WeeklyCalendar,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Prefix applied to every key this daemon touches
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Items allowed per rolling 24h cycle
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    /// Seconds between scheduling passes
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// How far from its planned instant a slot may still execute, seconds
    #[serde(default = "default_tolerance_secs")]
    pub tolerance_secs: u64,

    /// Civil timezone for all weekday/hour decisions
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// TTL on the cross-instance scan lock, seconds
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "postdaemon:".to_string()
}

fn default_daily_limit() -> u32 {
    17
}

fn default_tick_secs() -> u64 {
    60
}

fn default_tolerance_secs() -> u64 {
    5 * 60
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_lock_ttl_secs() -> u64 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            tick_secs: default_tick_secs(),
            tolerance_secs: default_tolerance_secs(),
            timezone: default_timezone(),
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

impl Config {
    /// Load config from an explicit file, from `postdaemon.yml` in the
    /// working directory, or fall back to defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            return Ok(config);
        }

        let default_path = PathBuf::from("postdaemon.yml");
        if default_path.exists() {
            let content = std::fs::read_to_string(&default_path)?;
            let config: Config = serde_yaml::from_str(&content)?;
            return Ok(config);
        }

        Ok(Config::default())
    }

    /// Resolve into engine settings; an unknown timezone is a startup error
    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            daily_limit: self.scheduler.daily_limit,
            tick_interval: Duration::from_secs(self.scheduler.tick_secs),
            tolerance: Duration::from_secs(self.scheduler.tolerance_secs),
            timezone: self.scheduler.timezone()?,
            key_prefix: self.store.key_prefix.clone(),
            lock_ttl: Duration::from_secs(self.scheduler.lock_ttl_secs),
        })
    }
}

impl SchedulerConfig {
    /// The configured civil timezone
    pub fn timezone(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| eyre!("invalid timezone '{}': {}", self.timezone, e))
    }
}
