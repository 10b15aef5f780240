//! PostDaemon - quota-bounded content-posting scheduler
//!
//! CLI entry point: runs the scheduler loop and offers read-only inspection
//! commands against the shared store.

use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use eyre::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use postdaemon::cli::{Cli, Command, OutputFormat};
use postdaemon::config::Config;
use postdaemon::pipeline::QueuePipeline;
use postdaemon::planner::plan_day;
use postdaemon::r#loop::Engine;
use postdaemon::state::{QuotaStore, ScheduleStore};
use postdaemon::transport::DryRunPublisher;
use watchstore::{KvStore, RedisStore};

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let level = match cli_log_level.map(|s| s.to_uppercase()).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => cmd_run(&config).await,
        Command::Init => cmd_init(&config).await,
        Command::Status { format } => cmd_status(&config, format).await,
        Command::Plan { seed, format } => cmd_plan(&config, seed, format).await,
        Command::Enqueue { items } => cmd_enqueue(&config, items).await,
    }
}

async fn connect(config: &Config) -> Result<Arc<dyn KvStore>> {
    let store = RedisStore::connect(&config.store.redis_url)
        .await
        .context("Failed to connect to the store")?;
    Ok(Arc::new(store))
}

/// Run the scheduler loop until SIGINT/SIGTERM
async fn cmd_run(config: &Config) -> Result<()> {
    // Resolve the timezone before touching the network so a bad config
    // fails fast.
    let engine_config = config.engine_config()?;
    let store = connect(config).await?;

    let pipeline = Arc::new(QueuePipeline::new(store.clone(), &config.store.key_prefix));
    let transport = Arc::new(DryRunPublisher::new());
    let mut engine = Engine::new(
        engine_config,
        config.calendar.clone(),
        store,
        pipeline,
        transport,
    );
    engine
        .initialize()
        .await
        .context("Failed to initialize scheduler state")?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(()).await;
    });

    engine.run(shutdown_rx).await
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let sigint = signal(SignalKind::interrupt());
        let sigterm = signal(SignalKind::terminate());
        let (Ok(mut sigint), Ok(mut sigterm)) = (sigint, sigterm) else {
            warn!("failed to install signal handlers");
            return;
        };

        tokio::select! {
            _ = sigint.recv() => warn!("SIGINT received"),
            _ = sigterm.recv() => warn!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        warn!("Ctrl+C received");
    }
}

/// Ensure the quota exists, then exit
async fn cmd_init(config: &Config) -> Result<()> {
    let store = connect(config).await?;
    let quota = QuotaStore::new(
        store,
        &config.store.key_prefix,
        config.scheduler.daily_limit,
    );
    quota.initialize_if_absent(Utc::now()).await?;
    info!("scheduler state initialized");
    println!("Initialized (daily limit: {})", config.scheduler.daily_limit);
    Ok(())
}

/// Show remaining quota and today's planned slots
async fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    let tz = config.scheduler.timezone()?;
    let store = connect(config).await?;
    let quota = QuotaStore::new(
        store.clone(),
        &config.store.key_prefix,
        config.scheduler.daily_limit,
    );
    let schedule = ScheduleStore::new(store, &config.store.key_prefix);

    let remaining = quota.remaining().await?;
    let slots = schedule.get().await?.unwrap_or_default();
    let executed = slots.iter().filter(|s| s.executed).count();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "remaining_quota": remaining,
                "daily_limit": config.scheduler.daily_limit,
                "slots": slots,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("PostDaemon Status");
            println!("-----------------");
            println!("Remaining quota: {}/{}", remaining, config.scheduler.daily_limit);
            if slots.is_empty() {
                println!("No schedule persisted yet");
            } else {
                println!("Slots ({} executed of {}):", executed, slots.len());
                for slot in &slots {
                    let mark = if slot.executed { "x" } else { " " };
                    println!("  [{}] {}", mark, slot.post_time.with_timezone(&tz));
                }
            }
        }
    }

    Ok(())
}

/// Print the distribution the planner would produce right now, without
/// persisting anything
async fn cmd_plan(config: &Config, seed: Option<u64>, format: OutputFormat) -> Result<()> {
    let tz = config.scheduler.timezone()?;
    let store = connect(config).await?;
    let quota = QuotaStore::new(
        store,
        &config.store.key_prefix,
        config.scheduler.daily_limit,
    );

    let now = Utc::now().with_timezone(&tz);
    let remaining = quota.remaining().await?;
    let day = config.calendar.for_weekday(chrono::Datelike::weekday(&now));

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let distributions = plan_day(remaining, day, now.date_naive(), tz, &mut rng);

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "date": now.date_naive().to_string(),
                "remaining_quota": remaining,
                "windows": distributions
                    .iter()
                    .map(|d| {
                        serde_json::json!({
                            "start_hour": d.window.start_hour,
                            "end_hour": d.window.end_hour,
                            "count": d.count,
                            "times": d.times.iter().map(|t| t.to_rfc3339()).collect::<Vec<_>>(),
                        })
                    })
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("Plan for {} ({} remaining)", now.date_naive(), remaining);
            if distributions.is_empty() {
                println!("Nothing to post today");
            }
            for dist in &distributions {
                println!(
                    "  {:02}:00-{:02}:59 ({} posts):",
                    dist.window.start_hour, dist.window.end_hour, dist.count
                );
                for time in &dist.times {
                    println!("    {}", time.format("%H:%M:%S"));
                }
            }
        }
    }

    Ok(())
}

/// Append a draft batch to the publish queue
async fn cmd_enqueue(config: &Config, items: Vec<String>) -> Result<()> {
    let store = connect(config).await?;
    let queue = QueuePipeline::new(store, &config.store.key_prefix);

    let count = items.len();
    queue.enqueue(items).await?;
    let depth = queue.len().await?;
    println!("Enqueued {} item(s); {} batch(es) waiting", count, depth);
    Ok(())
}
