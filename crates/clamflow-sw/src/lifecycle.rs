//! Worker lifecycle: install (precache), activate (evict stale namespaces,
//! claim clients).
//!
//! ```text
//! Parsed ──Install──→ Installing ──→ Waiting ──Activate──→ Activating ──→ Activated
//!                                                              ↑              │
//!                                                              └──Activate────┘
//! ```

use std::sync::Arc;
use std::time::Instant;

use clamflow_cache::{CacheStorage, RequestKey, ResponseSnapshot};
use clamflow_common::{SwError, SwResult, WorkerConfig};
use clamflow_net::{Fetcher, Request};
use futures::future::join_all;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::clients::Clients;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Script loaded, no lifecycle event seen yet.
    #[default]
    Parsed,
    /// Install event in progress.
    Installing,
    /// Installed, eligible for activation.
    Waiting,
    /// Activate event in progress.
    Activating,
    /// Active and controlling clients.
    Activated,
}

impl LifecycleState {
    /// Whether fetch events are intercepted in this state.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, LifecycleState::Activated)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Parsed => write!(f, "parsed"),
            LifecycleState::Installing => write!(f, "installing"),
            LifecycleState::Waiting => write!(f, "waiting"),
            LifecycleState::Activating => write!(f, "activating"),
            LifecycleState::Activated => write!(f, "activated"),
        }
    }
}

/// Outcome of an install event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// URLs written to the shell namespace.
    pub precached: Vec<String>,
    /// URLs that could not be precached, with the reason.
    pub failed: Vec<(String, String)>,
    /// Activation may proceed without waiting for old clients to close.
    pub skip_waiting: bool,
}

/// Outcome of an activate event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Stale namespaces removed.
    pub deleted: Vec<String>,
    /// Clients newly taken under control.
    pub claimed: usize,
    /// Cleanup failures; activation proceeded regardless.
    pub cleanup_errors: Vec<String>,
}

/// Drives install and activate against the cache storage.
pub struct LifecycleManager {
    config: Arc<WorkerConfig>,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
    state: RwLock<LifecycleState>,
}

impl LifecycleManager {
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            state: RwLock::new(LifecycleState::Parsed),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    async fn set_state(&self, state: LifecycleState) {
        *self.state.write().await = state;
        info!(state = %state, "Lifecycle state changed");
    }

    /// Populate the shell namespace with the precache list.
    ///
    /// Individual URL failures are logged and reported, never propagated.
    pub async fn install(&self) -> SwResult<InstallReport> {
        {
            let state = self.state.read().await;
            if matches!(*state, LifecycleState::Installing | LifecycleState::Activating) {
                return Err(SwError::state(format!("cannot install while {}", *state)));
            }
        }
        self.set_state(LifecycleState::Installing).await;
        let started = Instant::now();

        let mut report = InstallReport::default();
        match self.storage.open(&self.config.shell_cache).await {
            Ok(cache) => {
                info!(namespace = %self.config.shell_cache, "Caching app shell");
                let results = join_all(
                    self.config
                        .precache_urls
                        .iter()
                        .map(|path| self.precache_one(&cache, path)),
                )
                .await;

                for (path, result) in self.config.precache_urls.iter().zip(results) {
                    match result {
                        Ok(()) => report.precached.push(path.clone()),
                        Err(err) => {
                            warn!(
                                url = %path,
                                category = err.category(),
                                error = %err,
                                "Failed to precache"
                            );
                            report.failed.push((path.clone(), err.to_string()));
                        }
                    }
                }
            }
            Err(err) => {
                warn!(
                    namespace = %self.config.shell_cache,
                    category = err.category(),
                    error = %err,
                    "Could not open shell namespace"
                );
                report.failed.extend(
                    self.config
                        .precache_urls
                        .iter()
                        .map(|path| (path.clone(), err.to_string())),
                );
            }
        }

        report.skip_waiting = true;
        self.set_state(LifecycleState::Waiting).await;
        info!(
            precached = report.precached.len(),
            failed = report.failed.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Install complete, skipping wait"
        );
        Ok(report)
    }

    async fn precache_one(&self, cache: &clamflow_cache::Cache, path: &str) -> SwResult<()> {
        let url = self.config.resolve(path)?;
        let response = self.fetcher.fetch(&Request::get(url.clone())).await?;
        if response.status != StatusCode::OK {
            return Err(SwError::network(format!("unexpected status {}", response.status)));
        }
        cache
            .put(&RequestKey::get(&url), &ResponseSnapshot::capture(&response))
            .await
    }

    /// Delete every namespace that is not current, then claim all clients.
    ///
    /// Cleanup is best effort: storage failures are logged and reported, and
    /// clients are claimed regardless.
    pub async fn activate(&self, clients: &RwLock<Clients>) -> SwResult<ActivateReport> {
        {
            let state = self.state.read().await;
            if !matches!(*state, LifecycleState::Waiting | LifecycleState::Activated) {
                return Err(SwError::state(format!("cannot activate while {}", *state)));
            }
        }
        self.set_state(LifecycleState::Activating).await;

        let mut report = ActivateReport::default();
        match self.storage.keys().await {
            Ok(names) => {
                for name in names {
                    if self.config.is_current_namespace(&name) {
                        continue;
                    }
                    info!(namespace = %name, "Deleting old cache");
                    match self.storage.delete(&name).await {
                        Ok(_) => report.deleted.push(name),
                        Err(err) => {
                            warn!(
                                namespace = %name,
                                category = err.category(),
                                error = %err,
                                "Failed to delete old cache"
                            );
                            report.cleanup_errors.push(err.to_string());
                        }
                    }
                }
            }
            Err(err) => {
                warn!(category = err.category(), error = %err, "Failed to list caches");
                report.cleanup_errors.push(err.to_string());
            }
        }

        report.claimed = clients.write().await.claim();
        info!(claimed = report.claimed, "Claimed clients");

        self.set_state(LifecycleState::Activated).await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{Client, ClientMatchOptions};
    use crate::mock::{FailingBackend, MockFetcher};
    use url::Url;

    fn manager(config: WorkerConfig) -> (LifecycleManager, CacheStorage, Arc<MockFetcher>) {
        let storage = CacheStorage::in_memory();
        let fetcher = Arc::new(MockFetcher::new());
        let manager = LifecycleManager::new(Arc::new(config), storage.clone(), fetcher.clone());
        (manager, storage, fetcher)
    }

    #[tokio::test]
    async fn test_install_tolerates_missing_urls() {
        let (manager, storage, fetcher) = manager(WorkerConfig::default());
        fetcher.route("http://localhost:3000/", 200, "home");
        fetcher.route("http://localhost:3000/login", 200, "login");

        let report = manager.install().await.unwrap();

        assert!(report.skip_waiting);
        assert_eq!(report.precached, vec!["/", "/login"]);
        assert_eq!(report.failed.len(), 3);
        assert_eq!(manager.state().await, LifecycleState::Waiting);

        let cache = storage.open("clamflow-shell-v1.0.1").await.unwrap();
        assert_eq!(cache.keys().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_install_offline_still_completes() {
        let (manager, _storage, fetcher) = manager(WorkerConfig::default());
        fetcher.set_offline(true);

        let report = manager.install().await.unwrap();
        assert!(report.precached.is_empty());
        assert_eq!(report.failed.len(), 5);
        assert_eq!(manager.state().await, LifecycleState::Waiting);
    }

    #[tokio::test]
    async fn test_activate_requires_install() {
        let (manager, _storage, _fetcher) = manager(WorkerConfig::default());
        let clients = RwLock::new(Clients::new());

        assert!(matches!(
            manager.activate(&clients).await,
            Err(SwError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_activate_deletes_stale_and_claims() {
        let config = WorkerConfig {
            precache_urls: Vec::new(),
            ..WorkerConfig::default()
        };
        let (manager, storage, _fetcher) = manager(config);
        storage.open("clamflow-v1.0.0").await.unwrap();
        storage.open("clamflow-api-v1.0.1").await.unwrap();

        let clients = RwLock::new(Clients::new());
        clients
            .write()
            .await
            .add(Client::window(Url::parse("http://localhost:3000/").unwrap()));

        manager.install().await.unwrap();
        let report = manager.activate(&clients).await.unwrap();

        assert_eq!(report.deleted, vec!["clamflow-v1.0.0"]);
        assert_eq!(report.claimed, 1);
        assert!(report.cleanup_errors.is_empty());
        assert_eq!(manager.state().await, LifecycleState::Activated);
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["clamflow-api-v1.0.1", "clamflow-shell-v1.0.1"]
        );
    }

    #[tokio::test]
    async fn test_activate_twice_is_idempotent() {
        let (manager, storage, _fetcher) = manager(WorkerConfig::default());
        let clients = RwLock::new(Clients::new());

        manager.install().await.unwrap();
        manager.activate(&clients).await.unwrap();
        let before = storage.keys().await.unwrap();

        let report = manager.activate(&clients).await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.claimed, 0);
        assert_eq!(storage.keys().await.unwrap(), before);
    }

    fn failing_manager(backend: FailingBackend) -> LifecycleManager {
        LifecycleManager::new(
            Arc::new(WorkerConfig::default()),
            CacheStorage::new(Arc::new(backend)),
            Arc::new(MockFetcher::new()),
        )
    }

    fn one_client() -> RwLock<Clients> {
        let mut clients = Clients::new();
        clients.add(Client::window(Url::parse("http://localhost:3000/").unwrap()));
        RwLock::new(clients)
    }

    #[tokio::test]
    async fn test_install_completes_when_storage_is_unavailable() {
        let manager = failing_manager(FailingBackend::new());

        let report = manager.install().await.unwrap();

        assert!(report.skip_waiting);
        assert!(report.precached.is_empty());
        assert_eq!(report.failed.len(), 5);
        assert_eq!(manager.state().await, LifecycleState::Waiting);
    }

    #[tokio::test]
    async fn test_activate_claims_when_listing_fails() {
        let manager = failing_manager(FailingBackend::new());
        let clients = one_client();
        manager.install().await.unwrap();

        let report = manager.activate(&clients).await.unwrap();

        assert_eq!(report.cleanup_errors.len(), 1);
        assert!(report.deleted.is_empty());
        assert_eq!(report.claimed, 1);
        assert_eq!(manager.state().await, LifecycleState::Activated);
    }

    #[tokio::test]
    async fn test_activate_claims_when_delete_fails() {
        let manager = failing_manager(FailingBackend::listing(&[
            "clamflow-api-v1.0.1",
            "clamflow-v1.0.0",
            "clamflow-api-v0.9",
        ]));
        let clients = one_client();
        manager.install().await.unwrap();

        let report = manager.activate(&clients).await.unwrap();

        assert_eq!(report.cleanup_errors.len(), 2);
        assert!(report.deleted.is_empty());
        assert_eq!(report.claimed, 1);
        let registry = clients.read().await;
        assert_eq!(registry.match_all(&ClientMatchOptions::default()).len(), 1);
        assert_eq!(manager.state().await, LifecycleState::Activated);
    }
}
