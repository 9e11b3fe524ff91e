//! Shared fixtures for worker scenarios.

use std::sync::Arc;

use clamflow_cache::CacheStorage;
use clamflow_common::WorkerConfig;
use clamflow_net::{Request, Response};
use clamflow_sw::{EventOutcome, ServiceWorker, WorkerEvent};
use url::Url;

#[allow(dead_code)]
#[path = "../../src/mock.rs"]
mod mock;

pub use mock::MockFetcher;

pub const ORIGIN: &str = "http://localhost:3000";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub struct Fixture {
    pub worker: ServiceWorker,
    pub storage: CacheStorage,
    pub fetcher: Arc<MockFetcher>,
}

impl Fixture {
    /// Serve `path` on the origin.
    pub fn route(&self, path: &str, status: u16, content_type: &'static str, body: &str) {
        self.fetcher
            .route_typed(url(path).as_str(), status, content_type, body);
    }
}

/// A worker over in-memory storage. Routes should be added before `start`.
pub fn fixture(config: WorkerConfig) -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("clamflow_sw=debug")
        .with_test_writer()
        .try_init();

    let storage = CacheStorage::in_memory();
    let fetcher = Arc::new(MockFetcher::new());
    let (worker, _signals) = ServiceWorker::new(config, storage.clone(), fetcher.clone());
    Fixture {
        worker,
        storage,
        fetcher,
    }
}

/// Dispatch a fetch to an active worker and wait for its cache write.
pub async fn fetch(worker: &ServiceWorker, request: Request) -> Response {
    match worker.dispatch(WorkerEvent::Fetch(request)).await.unwrap() {
        EventOutcome::RespondWith(outcome) => outcome.settle().await,
        other => panic!("expected an intercepted fetch, got {:?}", other),
    }
}
