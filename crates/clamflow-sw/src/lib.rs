//! # ClamFlow Worker
//!
//! Offline-resilience layer for the ClamFlow application shell.
//!
//! ## Features
//!
//! - **Classification**: every intercepted request maps to one strategy
//! - **Strategies**: network-first, cache-first, navigation fallback, passthrough
//! - **Lifecycle**: install (precache), activate (stale namespace eviction)
//! - **Notifications**: push payload parsing, click routing to windows
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker::dispatch(WorkerEvent)
//!     │
//!     ├── Install / Activate ──→ LifecycleManager ──→ CacheStorage, Clients
//!     │
//!     ├── Fetch ──→ Classifier ──→ Strategies ──→ Fetcher, CacheStorage
//!     │                                  └── FetchOutcome (response + pending write)
//!     │
//!     ├── Push ──→ Notification::from_push
//!     ├── NotificationClick ──→ route_click ──→ Clients
//!     └── Sync ──→ acknowledged
//!
//! WorkerSignal ──mpsc──→ host
//! ```

pub mod classify;
pub mod clients;
pub mod event;
pub mod lifecycle;
pub mod notification;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod mock;

pub use classify::{ClassificationRule, Classifier, RuleMatch, StrategyKind};
pub use clients::{Client, ClientMatchOptions, ClientType, Clients};
pub use event::{EventKind, EventOutcome, WorkerEvent, WorkerSignal};
pub use lifecycle::{ActivateReport, InstallReport, LifecycleManager, LifecycleState};
pub use notification::{
    click_target, route_click, ClickOutcome, Notification, NotificationAction, NotificationClick,
    NotificationData, PushPayload, ACTION_CLOSE, ACTION_EXPLORE,
};
pub use strategy::{
    api_unavailable_response, offline_page_response, BackgroundWrite, FetchOutcome, Strategies,
    NETWORK_UNAVAILABLE, OFFLINE_BODY,
};
pub use worker::ServiceWorker;
