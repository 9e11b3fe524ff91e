//! ClamFlow worker host.
//!
//! Drives the offline worker from the command line against a live origin.
//!
//! ## Usage
//!
//! ```bash
//! # Precache the shell and evict stale namespaces
//! clamflow-host --db worker.db start
//!
//! # Fetch through the worker
//! clamflow-host --db worker.db fetch /dashboard
//! clamflow-host --db worker.db fetch /reports --navigate
//!
//! # Show the notification a push would produce
//! clamflow-host push '{"title":"QC","body":"Lot 7 approved"}'
//!
//! # Replay a recorded session
//! clamflow-host --db worker.db replay session.jsonl
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clamflow_cache::{CacheStorage, SqliteBackend};
use clamflow_common::{init_logging, LogConfig, LogFormat, WorkerConfig};
use clamflow_net::{FetchConfig, HttpFetcher};
use clamflow_sw::{
    ClickOutcome, Client, EventOutcome, NotificationClick, PushPayload, ServiceWorker,
    WorkerEvent,
};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

mod replay;

#[derive(Parser)]
#[command(name = "clamflow-host")]
#[command(about = "Command-line host for the ClamFlow offline worker")]
#[command(version)]
struct Cli {
    /// Worker configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite cache store; in-memory when omitted
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Precache the app shell
    Install,

    /// Install, then evict stale namespaces and claim clients
    Activate,

    /// Install and activate, printing both reports
    Start,

    /// Fetch a URL through the active worker
    Fetch {
        /// Absolute URL or path on the configured origin
        url: String,
        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,
        /// Treat as a top-level navigation
        #[arg(long)]
        navigate: bool,
    },

    /// Print the notification produced by a push payload
    Push {
        /// Payload text or JSON
        payload: Option<String>,
    },

    /// Route a notification click
    Click {
        /// Notification target URL
        url: String,
        /// Action button pressed
        #[arg(short, long)]
        action: Option<String>,
        /// Open client window URLs
        #[arg(long = "client")]
        clients: Vec<String>,
    },

    /// List stored cache namespaces
    Namespaces,

    /// Replay newline-delimited JSON events
    Replay {
        /// Event file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::debug()
    } else {
        LogConfig::default()
    };
    init_logging(log_config.with_format(cli.log_format));

    let config = match &cli.config {
        Some(path) => WorkerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => WorkerConfig::default(),
    };

    let storage = match &cli.db {
        Some(path) => CacheStorage::new(Arc::new(
            SqliteBackend::open(path)
                .with_context(|| format!("opening cache store {}", path.display()))?,
        )),
        None => CacheStorage::in_memory(),
    };

    if let Commands::Namespaces = cli.command {
        return list_namespaces(&storage).await;
    }

    let fetcher = Arc::new(HttpFetcher::new(FetchConfig::default())?);
    let (worker, mut signals) = ServiceWorker::new(config, storage, fetcher);
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            debug!(?signal, "Worker signal");
        }
    });

    match cli.command {
        Commands::Install => {
            let report = worker.install().await?;
            println!("precached: {}", report.precached.join(", "));
            for (url, reason) in &report.failed {
                println!("failed: {} ({})", url, reason);
            }
        }
        Commands::Activate => {
            let (_, report) = worker.start().await?;
            print_activate(&report);
        }
        Commands::Start => {
            let (installed, activated) = worker.start().await?;
            println!(
                "precached {} of {}",
                installed.precached.len(),
                installed.precached.len() + installed.failed.len()
            );
            print_activate(&activated);
        }
        Commands::Fetch {
            url,
            method,
            navigate,
        } => {
            worker.start().await?;
            let request = replay::build_request(worker.config(), &url, &method, navigate)?;
            let (response, served_by) = match worker.dispatch(WorkerEvent::Fetch(request)).await? {
                EventOutcome::RespondWith(outcome) => {
                    let strategy = outcome.strategy;
                    (outcome.settle().await, strategy.to_string())
                }
                EventOutcome::Forward(response) => (response, "forward".to_string()),
                other => anyhow::bail!("unexpected outcome {:?}", other),
            };
            println!("{} ({}, {:?})", response.status, served_by, response.source);
            println!("{}", String::from_utf8_lossy(&response.body));
        }
        Commands::Push { payload } => {
            let payload = payload.map(PushPayload::new).unwrap_or_default();
            let notification = worker.handle_push(&payload);
            println!("{}", serde_json::to_string_pretty(&notification)?);
        }
        Commands::Click {
            url,
            action,
            clients,
        } => {
            {
                let registry = worker.clients();
                let mut registry = registry.write().await;
                for client in &clients {
                    registry.add(Client::window(worker.config().resolve(client)?));
                }
            }
            let body = serde_json::json!({ "url": url }).to_string();
            let notification = worker.handle_push(&PushPayload::new(body));
            let click = NotificationClick {
                notification,
                action,
            };
            match worker.handle_notification_click(&click).await? {
                ClickOutcome::Closed => println!("closed"),
                ClickOutcome::Focused { client_id, url } => {
                    println!("focused {} at {}", client_id, url)
                }
                ClickOutcome::Opened { client_id, url } => {
                    println!("opened {} at {}", client_id, url)
                }
            }
        }
        Commands::Replay { file } => {
            let input = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let events = replay::parse_events(&input)?;
            info!(events = events.len(), "Replaying");
            let summary = replay::replay(&worker, events).await?;
            println!(
                "{} fetches, {} lifecycle, {} notifications, {} syncs",
                summary.fetches.len(),
                summary.lifecycle,
                summary.notifications,
                summary.syncs
            );
        }
        Commands::Namespaces => {}
    }

    Ok(())
}

async fn list_namespaces(storage: &CacheStorage) -> anyhow::Result<()> {
    for name in storage.keys().await? {
        let entries = storage.open(&name).await?.keys().await?.len();
        println!("{} ({} entries)", name, entries);
    }
    Ok(())
}

fn print_activate(report: &clamflow_sw::ActivateReport) {
    for name in &report.deleted {
        println!("deleted: {}", name);
    }
    for err in &report.cleanup_errors {
        println!("cleanup error: {}", err);
    }
    println!("claimed {} clients", report.claimed);
}
