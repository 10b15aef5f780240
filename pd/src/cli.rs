//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "pd", about = "Quota-bounded content-posting scheduler", version)]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler loop (default)
    Run,
    /// Ensure the quota exists in the store, then exit
    Init,
    /// Show remaining quota and today's planned slots
    Status {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the distribution the planner would produce right now
    Plan {
        /// Seed the planner for reproducible output
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Append a draft batch to the publish queue
    Enqueue {
        /// Items in thread order
        #[arg(required = true)]
        items: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
