//! Worker events, their outcomes, and the signals the worker emits.

use std::fmt;

use clamflow_net::{Request, Response};

use crate::classify::StrategyKind;
use crate::lifecycle::LifecycleState;
use crate::notification::{ClickOutcome, Notification, NotificationClick, PushPayload};
use crate::strategy::FetchOutcome;

/// An event delivered to the worker by the host.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Push(PushPayload),
    NotificationClick(NotificationClick),
    Sync { tag: String },
}

impl WorkerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WorkerEvent::Install => EventKind::Install,
            WorkerEvent::Activate => EventKind::Activate,
            WorkerEvent::Fetch(_) => EventKind::Fetch,
            WorkerEvent::Push(_) => EventKind::Push,
            WorkerEvent::NotificationClick(_) => EventKind::NotificationClick,
            WorkerEvent::Sync { .. } => EventKind::Sync,
        }
    }
}

/// Event discriminant, used for logging and dispatch bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Install,
    Activate,
    Fetch,
    Push,
    NotificationClick,
    Sync,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Install => "install",
            EventKind::Activate => "activate",
            EventKind::Fetch => "fetch",
            EventKind::Push => "push",
            EventKind::NotificationClick => "notificationclick",
            EventKind::Sync => "sync",
        };
        f.write_str(name)
    }
}

/// What handling an event produced.
#[derive(Debug)]
pub enum EventOutcome {
    /// Lifecycle event finished; the worker is now in this state.
    Lifecycle(LifecycleState),
    /// Fetch intercepted by a strategy.
    RespondWith(FetchOutcome),
    /// Fetch not intercepted; the network response is passed on unmodified.
    Forward(Response),
    /// A notification should be displayed.
    ShowNotification(Notification),
    /// A notification click was handled.
    Click(ClickOutcome),
    /// Sync event acknowledged.
    Synced,
}

impl EventOutcome {
    /// The response for fetch outcomes.
    pub fn response(&self) -> Option<&Response> {
        match self {
            EventOutcome::RespondWith(outcome) => Some(&outcome.response),
            EventOutcome::Forward(response) => Some(response),
            _ => None,
        }
    }

    /// The strategy that served a fetch, if one was applied.
    pub fn strategy(&self) -> Option<StrategyKind> {
        match self {
            EventOutcome::RespondWith(outcome) => Some(outcome.strategy),
            _ => None,
        }
    }
}

/// Signals emitted to the host as the worker changes.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerSignal {
    /// Lifecycle state changed.
    StateChange { state: LifecycleState },
    /// A notification was shown.
    NotificationShown { title: String, tag: Option<String> },
    /// A notification was closed by a click.
    NotificationClosed { title: String },
    /// Clients were claimed on activation.
    ClientsClaimed { count: usize },
    /// A stale namespace was deleted on activation.
    NamespaceDeleted { name: String },
}
