//! Operator CLI for the Nobel prize event stream.
//!
//! Three subcommands share one event log:
//!
//! ```text
//! publish --> Publisher --> EventLog --> Subscriber --> listen
//!                              |
//!                              +--> LastMessageQuery --> last
//! ```
//!
//! By default the log is the NATS `JetStream` stream named by the
//! environment. With `--journal PATH` the commands run against an
//! in-process log journaled to `PATH` instead, which needs no broker.
//! Only one process may hold a journal at a time, so in that mode `listen`
//! sees the retained history (with `EVENTS_DELIVER_FROM=all`) but never
//! events published by another process.

mod error;
mod feed;
mod last;
mod listen;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use nobel_events::{EventLog, EventsConfig, JetStreamLog, MemoryLog, Publisher};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::feed::{DEFAULT_NOBEL_API_URL, FeedSource};
use crate::last::EventKind;

/// Publish, watch and inspect Nobel prize events.
#[derive(Debug, Parser)]
#[command(name = "nobel-notifier", version, propagate_version = true)]
struct Cli {
    /// NATS server URL; overrides `NATS_URL`.
    #[arg(long, global = true)]
    nats_url: Option<String>,

    /// Use an in-process log journaled to this file instead of NATS.
    ///
    /// The file is locked while the command runs; a second process using
    /// the same journal fails to start.
    #[arg(long, global = true, env = "NOBEL_JOURNAL")]
    journal: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log every prize and laureate event until Ctrl-C.
    Listen,

    /// Print the last retained event of one kind.
    Last {
        /// Event kind to read.
        #[arg(long = "type", value_enum, default_value_t = EventKind::Prize)]
        kind: EventKind,
    },

    /// Load a Nobel API dump and publish it.
    Publish {
        /// Read the dump from a local JSON file; takes precedence over `--url`.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Fetch the dump from this URL.
        #[arg(long, env = "NOBEL_API_URL", default_value = DEFAULT_NOBEL_API_URL)]
        url: String,
    },
}

/// Application entry point.
///
/// Initializes logging, loads configuration from environment variables,
/// opens the selected log and dispatches the subcommand.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    let mut config = EventsConfig::from_env().context("invalid event configuration")?;
    if let Some(url) = cli.nats_url {
        config.nats_url = url;
    }
    info!(
        stream = %config.stream_name,
        max_age_secs = config.max_age.as_secs(),
        deliver_from = %config.deliver_from,
        "configuration loaded"
    );

    match cli.journal {
        Some(path) => {
            let log = MemoryLog::open(&path, &config)
                .with_context(|| format!("failed to open journal {}", path.display()))?;
            run(cli.command, log).await
        }
        None => {
            let log = JetStreamLog::connect(&config).await?;
            run(cli.command, log).await
        }
    }
}

async fn run<L: EventLog>(command: Command, log: L) -> anyhow::Result<()> {
    match command {
        Command::Listen => listen::run(log).await,
        Command::Last { kind } => {
            let text = last::run(log, kind).await?;
            print!("{text}");
            Ok(())
        }
        Command::Publish { file, url } => {
            let source = feed_source(file, url);
            let response = feed::load(&source)
                .await
                .with_context(|| format!("failed to load feed from {source:?}"))?;
            let report = feed::publish_feed(&Publisher::new(log), response).await?;
            println!(
                "published {} laureates and {} prizes ({} failed)",
                report.laureates, report.prizes, report.failed
            );
            Ok(())
        }
    }
}

/// `--file` wins over `--url` (which may come from the environment).
fn feed_source(file: Option<PathBuf>, url: String) -> FeedSource {
    file.map_or(FeedSource::Url(url), FeedSource::File)
}
