//! Replay of recorded worker events.
//!
//! Input is newline-delimited JSON, one event per line:
//!
//! ```text
//! {"event":"install"}
//! {"event":"activate"}
//! {"event":"fetch","url":"/api/lots"}
//! {"event":"fetch","url":"/reports","navigate":true}
//! {"event":"push","payload":"Batch 42 ready"}
//! {"event":"sync","tag":"background-sync"}
//! ```
//!
//! Consecutive fetches are dispatched together; every other event waits for
//! the fetches before it.

use anyhow::Context;
use clamflow_common::WorkerConfig;
use clamflow_net::Request;
use clamflow_sw::{EventOutcome, PushPayload, ServiceWorker, WorkerEvent};
use futures::future::join_all;
use http::Method;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplayEvent {
    Install,
    Activate,
    Fetch {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        navigate: bool,
    },
    Push {
        #[serde(default)]
        payload: Option<String>,
    },
    Sync {
        tag: String,
    },
}

fn default_method() -> String {
    "GET".to_string()
}

/// Totals for a finished replay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub lifecycle: usize,
    /// (url, status) per fetch, in input order.
    pub fetches: Vec<(String, u16)>,
    pub notifications: usize,
    pub syncs: usize,
}

/// Parse newline-delimited events. Blank lines and `#` comments are skipped.
pub fn parse_events(input: &str) -> anyhow::Result<Vec<ReplayEvent>> {
    input
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: invalid event", n))
        })
        .collect()
}

/// Build a request for `target`, resolved against the configured origin.
pub fn build_request(
    config: &WorkerConfig,
    target: &str,
    method: &str,
    navigate: bool,
) -> anyhow::Result<Request> {
    let url = config.resolve(target)?;
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method {}", method))?;
    let request = if navigate {
        Request::navigate(url)
    } else {
        Request::get(url)
    };
    Ok(request.method(method))
}

/// Dispatch every event against the worker.
pub async fn replay(
    worker: &ServiceWorker,
    events: Vec<ReplayEvent>,
) -> anyhow::Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    let mut batch: Vec<Request> = Vec::new();
    let mut writes: Vec<JoinHandle<()>> = Vec::new();

    for event in events {
        if let ReplayEvent::Fetch {
            url,
            method,
            navigate,
        } = &event
        {
            batch.push(build_request(worker.config(), url, method, *navigate)?);
            continue;
        }
        flush(worker, &mut batch, &mut writes, &mut summary).await;

        match event {
            ReplayEvent::Install => {
                worker.dispatch(WorkerEvent::Install).await?;
                summary.lifecycle += 1;
            }
            ReplayEvent::Activate => {
                worker.dispatch(WorkerEvent::Activate).await?;
                summary.lifecycle += 1;
            }
            ReplayEvent::Push { payload } => {
                let payload = payload.map(PushPayload::new).unwrap_or_default();
                if let EventOutcome::ShowNotification(n) =
                    worker.dispatch(WorkerEvent::Push(payload)).await?
                {
                    println!("notification {:?}: {}", n.title, n.body);
                    summary.notifications += 1;
                }
            }
            ReplayEvent::Sync { tag } => {
                worker.dispatch(WorkerEvent::Sync { tag }).await?;
                summary.syncs += 1;
            }
            ReplayEvent::Fetch { .. } => {}
        }
    }
    flush(worker, &mut batch, &mut writes, &mut summary).await;

    for write in join_all(writes).await {
        if let Err(err) = write {
            warn!(error = %err, "Cache write task failed");
        }
    }
    info!(fetches = summary.fetches.len(), "Replay complete");
    Ok(summary)
}

async fn flush(
    worker: &ServiceWorker,
    batch: &mut Vec<Request>,
    writes: &mut Vec<JoinHandle<()>>,
    summary: &mut ReplaySummary,
) {
    if batch.is_empty() {
        return;
    }
    let outcomes = join_all(batch.iter().map(|request| worker.handle_fetch(request))).await;

    for (request, outcome) in batch.drain(..).zip(outcomes) {
        let (status, served_by) = match outcome {
            EventOutcome::RespondWith(mut outcome) => {
                if let Some(write) = outcome.take_background() {
                    writes.push(tokio::spawn(write));
                }
                (outcome.response.status, outcome.strategy.to_string())
            }
            EventOutcome::Forward(response) => (response.status, "forward".to_string()),
            other => {
                warn!(outcome = ?other, "Unexpected outcome for fetch");
                continue;
            }
        };
        println!("{} {} {} {}", status.as_u16(), served_by, request.method, request.url);
        summary
            .fetches
            .push((request.url.to_string(), status.as_u16()));
    }
}
