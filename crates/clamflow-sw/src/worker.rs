//! The worker: owns the strategies, lifecycle, and clients, and routes each
//! event to its handler.

use std::sync::Arc;

use clamflow_cache::CacheStorage;
use clamflow_common::{SwResult, WorkerConfig};
use clamflow_net::{Fetcher, Request, Response};
use http::StatusCode;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::classify::Classifier;
use crate::clients::Clients;
use crate::event::{EventOutcome, WorkerEvent, WorkerSignal};
use crate::lifecycle::{ActivateReport, InstallReport, LifecycleManager, LifecycleState};
use crate::notification::{route_click, ClickOutcome, Notification, NotificationClick, PushPayload};
use crate::strategy::{FetchOutcome, Strategies};

/// An offline-resilience worker for one origin.
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    classifier: Classifier,
    strategies: Strategies,
    lifecycle: LifecycleManager,
    fetcher: Arc<dyn Fetcher>,
    clients: Arc<RwLock<Clients>>,
    signal_tx: mpsc::UnboundedSender<WorkerSignal>,
}

impl ServiceWorker {
    /// Create a worker and the receiver for its signals.
    pub fn new(
        config: WorkerConfig,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerSignal>) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let config = Arc::new(config);

        let worker = Self {
            classifier: Classifier::from_config(&config),
            strategies: Strategies::new(config.clone(), storage.clone(), fetcher.clone()),
            lifecycle: LifecycleManager::new(config.clone(), storage, fetcher.clone()),
            fetcher,
            clients: Arc::new(RwLock::new(Clients::new())),
            signal_tx,
            config,
        };
        (worker, signal_rx)
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Shared client registry.
    pub fn clients(&self) -> Arc<RwLock<Clients>> {
        self.clients.clone()
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.state().await
    }

    /// Route an event to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> SwResult<EventOutcome> {
        debug!(event = %event.kind(), "Dispatching event");
        match event {
            WorkerEvent::Install => {
                self.install().await?;
                Ok(EventOutcome::Lifecycle(self.state().await))
            }
            WorkerEvent::Activate => {
                self.activate().await?;
                Ok(EventOutcome::Lifecycle(self.state().await))
            }
            WorkerEvent::Fetch(request) => Ok(self.handle_fetch(&request).await),
            WorkerEvent::Push(payload) => {
                Ok(EventOutcome::ShowNotification(self.handle_push(&payload)))
            }
            WorkerEvent::NotificationClick(click) => {
                Ok(EventOutcome::Click(self.handle_notification_click(&click).await?))
            }
            WorkerEvent::Sync { tag } => {
                self.handle_sync(&tag);
                Ok(EventOutcome::Synced)
            }
        }
    }

    /// Install, then activate immediately.
    pub async fn start(&self) -> SwResult<(InstallReport, ActivateReport)> {
        let installed = self.install().await?;
        let activated = self.activate().await?;
        Ok((installed, activated))
    }

    pub async fn install(&self) -> SwResult<InstallReport> {
        let report = self.lifecycle.install().await?;
        self.signal(WorkerSignal::StateChange {
            state: self.state().await,
        });
        Ok(report)
    }

    pub async fn activate(&self) -> SwResult<ActivateReport> {
        let report = self.lifecycle.activate(&self.clients).await?;
        for name in &report.deleted {
            self.signal(WorkerSignal::NamespaceDeleted { name: name.clone() });
        }
        self.signal(WorkerSignal::ClientsClaimed {
            count: report.claimed,
        });
        self.signal(WorkerSignal::StateChange {
            state: self.state().await,
        });
        Ok(report)
    }

    /// Answer a fetch. Before activation the request is not intercepted.
    pub async fn handle_fetch(&self, request: &Request) -> EventOutcome {
        if !self.state().await.can_intercept_fetch() {
            debug!(url = %request.url, "Not yet active, forwarding");
            return EventOutcome::Forward(self.forward(request).await);
        }
        EventOutcome::RespondWith(self.respond(request).await)
    }

    /// Classify and run the matching strategy.
    pub async fn respond(&self, request: &Request) -> FetchOutcome {
        let strategy = self.classifier.classify(request);
        self.strategies.execute(strategy, request).await
    }

    async fn forward(&self, request: &Request) -> Response {
        match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(url = %request.url, error = %err, "Forwarded fetch failed");
                Response::empty(StatusCode::SERVICE_UNAVAILABLE)
            }
        }
    }

    /// Build the notification for a push.
    pub fn handle_push(&self, payload: &PushPayload) -> Notification {
        let notification = Notification::from_push(payload, &self.config.notification);
        info!(title = %notification.title, "Showing notification");
        self.signal(WorkerSignal::NotificationShown {
            title: notification.title.clone(),
            tag: notification.tag.clone(),
        });
        notification
    }

    /// Close the clicked notification and route to its target.
    pub async fn handle_notification_click(
        &self,
        click: &NotificationClick,
    ) -> SwResult<ClickOutcome> {
        self.signal(WorkerSignal::NotificationClosed {
            title: click.notification.title.clone(),
        });
        let origin = self.config.origin_url()?;
        let mut clients = self.clients.write().await;
        route_click(
            click,
            &mut clients,
            &origin,
            &self.config.notification.default_url,
        )
    }

    /// Acknowledge a background sync. There is no offline queue to replay.
    pub fn handle_sync(&self, tag: &str) {
        if tag == self.config.sync_tag {
            info!(tag, "Background sync triggered");
        } else {
            debug!(tag, "Ignoring unknown sync tag");
        }
    }

    fn signal(&self, signal: WorkerSignal) {
        // Hosts may drop the receiver.
        let _ = self.signal_tx.send(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::StrategyKind;
    use crate::mock::MockFetcher;
    use url::Url;

    fn worker() -> (ServiceWorker, mpsc::UnboundedReceiver<WorkerSignal>, Arc<MockFetcher>) {
        let fetcher = Arc::new(MockFetcher::new());
        let (worker, rx) =
            ServiceWorker::new(WorkerConfig::default(), CacheStorage::in_memory(), fetcher.clone());
        (worker, rx, fetcher)
    }

    fn url(path: &str) -> Url {
        Url::parse("http://localhost:3000").unwrap().join(path).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_before_activation_is_forwarded() {
        let (worker, _rx, fetcher) = worker();
        fetcher.set_offline(true);

        let outcome = worker
            .dispatch(WorkerEvent::Fetch(Request::get(url("/api/lots"))))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Forward(_)));
        assert_eq!(outcome.strategy(), None);
        assert_eq!(
            outcome.response().unwrap().status,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_fetch_after_activation_is_intercepted() {
        let (worker, _rx, fetcher) = worker();
        fetcher.route("http://localhost:3000/api/lots", 200, "[]");
        worker.start().await.unwrap();

        let outcome = worker
            .dispatch(WorkerEvent::Fetch(Request::get(url("/api/lots"))))
            .await
            .unwrap();

        assert_eq!(outcome.strategy(), Some(StrategyKind::NetworkFirstApi));
        assert_eq!(outcome.response().unwrap().status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_lifecycle_signals() {
        let (worker, mut rx, _fetcher) = worker();
        worker.clients().write().await.add(crate::clients::Client::window(url("/")));

        assert!(matches!(
            worker.dispatch(WorkerEvent::Install).await.unwrap(),
            EventOutcome::Lifecycle(LifecycleState::Waiting)
        ));
        assert!(matches!(
            worker.dispatch(WorkerEvent::Activate).await.unwrap(),
            EventOutcome::Lifecycle(LifecycleState::Activated)
        ));

        let mut signals = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            signals.push(signal);
        }
        assert_eq!(
            signals,
            vec![
                WorkerSignal::StateChange {
                    state: LifecycleState::Waiting
                },
                WorkerSignal::ClientsClaimed { count: 1 },
                WorkerSignal::StateChange {
                    state: LifecycleState::Activated
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_push_signals_notification() {
        let (worker, mut rx, _fetcher) = worker();
        let outcome = worker
            .dispatch(WorkerEvent::Push(PushPayload::new("Batch 42 ready")))
            .await
            .unwrap();

        match outcome {
            EventOutcome::ShowNotification(n) => assert_eq!(n.body, "Batch 42 ready"),
            other => panic!("expected notification, got {:?}", other),
        }
        assert_eq!(
            rx.try_recv().unwrap(),
            WorkerSignal::NotificationShown {
                title: "ClamFlow".to_string(),
                tag: None
            }
        );
    }

    #[tokio::test]
    async fn test_sync_is_acknowledged() {
        let (worker, _rx, _fetcher) = worker();
        for tag in ["background-sync", "something-else"] {
            let outcome = worker
                .dispatch(WorkerEvent::Sync {
                    tag: tag.to_string(),
                })
                .await
                .unwrap();
            assert!(matches!(outcome, EventOutcome::Synced));
        }
    }
}
