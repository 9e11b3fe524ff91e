//! Strategy executors.
//!
//! Each executor turns a request into a response and never fails: every
//! network or storage failure resolves to a cached or synthesized response.
//!
//! ```text
//! NetworkFirstApi     fetch ─ok→ respond, write behind (api ns)
//!                           └err→ cache ─miss→ 503 {"success":false,...}
//! NetworkFirstAsset   fetch ─ok→ respond, write behind (shell ns)
//!                           └err→ cache ─miss→ 503 (empty)
//! CacheFirst          cache ─hit→ respond
//!                           └miss→ fetch ─ok→ write through (shell ns), respond
//!                                        └err→ 404 (empty)
//! NavigationFallback  fetch ─ok→ write through (shell ns), respond
//!                           └err→ same page ─miss→ home ─miss→ 503 "Offline"
//! Passthrough         fetch ─ok→ respond
//!                           └err→ 503 (empty)
//! ```

use std::fmt;
use std::sync::Arc;

use clamflow_cache::{CacheStorage, RequestKey, ResponseSnapshot};
use clamflow_common::WorkerConfig;
use clamflow_net::{Fetcher, NetError, Request, Response};
use futures::future::BoxFuture;
use futures::FutureExt;
use http::StatusCode;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::classify::StrategyKind;

/// Message carried by the synthesized API failure body.
pub const NETWORK_UNAVAILABLE: &str = "Network unavailable. Please check your connection.";

/// Body of the offline navigation page.
pub const OFFLINE_BODY: &str = "Offline";

/// A cache write that completes after the response has been handed back.
pub type BackgroundWrite = BoxFuture<'static, ()>;

#[derive(Serialize)]
struct ApiFailure<'a> {
    success: bool,
    error: &'a str,
}

/// The synthesized 503 returned for API requests that cannot be served.
pub fn api_unavailable_response() -> Response {
    let body = serde_json::to_vec(&ApiFailure {
        success: false,
        error: NETWORK_UNAVAILABLE,
    })
    .unwrap_or_default();
    Response::synthesized(
        StatusCode::SERVICE_UNAVAILABLE,
        Some("application/json"),
        body,
    )
}

/// The synthesized page returned when a navigation has nothing to fall back to.
pub fn offline_page_response() -> Response {
    Response::synthesized(
        StatusCode::SERVICE_UNAVAILABLE,
        Some("text/plain"),
        OFFLINE_BODY,
    )
}

/// Result of running one executor.
///
/// A network-first hit carries a pending cache write. Spawn it via
/// [`take_background`](Self::take_background) or await [`settle`](Self::settle).
#[must_use = "the pending cache write is lost if the outcome is dropped"]
pub struct FetchOutcome {
    pub response: Response,
    pub strategy: StrategyKind,
    background: Option<BackgroundWrite>,
}

impl FetchOutcome {
    fn new(strategy: StrategyKind, response: Response) -> Self {
        Self {
            response,
            strategy,
            background: None,
        }
    }

    fn with_background(mut self, write: BackgroundWrite) -> Self {
        self.background = Some(write);
        self
    }

    /// Whether a cache write is still owed for this response.
    pub fn has_pending_write(&self) -> bool {
        self.background.is_some()
    }

    /// Detach the pending cache write so the host can spawn it.
    pub fn take_background(&mut self) -> Option<BackgroundWrite> {
        self.background.take()
    }

    /// Finish the pending cache write, then yield the response.
    pub async fn settle(self) -> Response {
        if let Some(write) = self.background {
            write.await;
        }
        self.response
    }
}

impl fmt::Debug for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOutcome")
            .field("response", &self.response)
            .field("strategy", &self.strategy)
            .field("pending_write", &self.background.is_some())
            .finish()
    }
}

/// Synthesized response for a network-first miss.
#[derive(Debug, Clone, Copy)]
enum Fallback {
    ApiJson,
    Empty503,
}

impl Fallback {
    fn response(self) -> Response {
        match self {
            Fallback::ApiJson => api_unavailable_response(),
            Fallback::Empty503 => Response::empty(StatusCode::SERVICE_UNAVAILABLE),
        }
    }
}

/// Executors sharing one cache storage and one fetcher.
#[derive(Clone)]
pub struct Strategies {
    config: Arc<WorkerConfig>,
    storage: CacheStorage,
    fetcher: Arc<dyn Fetcher>,
}

impl Strategies {
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: CacheStorage,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
        }
    }

    /// Run the executor for `strategy`.
    pub async fn execute(&self, strategy: StrategyKind, request: &Request) -> FetchOutcome {
        match strategy {
            StrategyKind::NetworkFirstApi => {
                self.network_first(strategy, request, &self.config.api_cache, Fallback::ApiJson)
                    .await
            }
            StrategyKind::NetworkFirstAsset => {
                self.network_first(strategy, request, &self.config.shell_cache, Fallback::Empty503)
                    .await
            }
            StrategyKind::CacheFirst => self.cache_first(request).await,
            StrategyKind::NavigationFallback => self.navigation(request).await,
            StrategyKind::Passthrough => self.passthrough(request).await,
        }
    }

    async fn network_first(
        &self,
        strategy: StrategyKind,
        request: &Request,
        namespace: &str,
        fallback: Fallback,
    ) -> FetchOutcome {
        let key = RequestKey::from_request(request);

        match self.fetch(request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    let write = self.write_behind(namespace, key, &response);
                    FetchOutcome::new(strategy, response).with_background(write)
                } else {
                    FetchOutcome::new(strategy, response)
                }
            }
            Err(err) => {
                debug!(url = %request.url, error = %err, "Network failed, trying cache");
                let response = match self.lookup(namespace, &key).await {
                    Some(cached) => cached,
                    None => fallback.response(),
                };
                FetchOutcome::new(strategy, response)
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> FetchOutcome {
        let strategy = StrategyKind::CacheFirst;
        let namespace = self.config.shell_cache.as_str();
        let key = RequestKey::from_request(request);

        if let Some(cached) = self.lookup(namespace, &key).await {
            return FetchOutcome::new(strategy, cached);
        }

        match self.fetch(request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.write_through(namespace, &key, &response).await;
                }
                FetchOutcome::new(strategy, response)
            }
            Err(err) => {
                debug!(url = %request.url, error = %err, "Cache miss and network failed");
                FetchOutcome::new(strategy, Response::empty(StatusCode::NOT_FOUND))
            }
        }
    }

    async fn navigation(&self, request: &Request) -> FetchOutcome {
        let strategy = StrategyKind::NavigationFallback;
        let namespace = self.config.shell_cache.as_str();
        let key = RequestKey::from_request(request);

        let err = match self.fetch(request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.write_through(namespace, &key, &response).await;
                }
                return FetchOutcome::new(strategy, response);
            }
            Err(err) => err,
        };
        debug!(url = %request.url, error = %err, "Navigation offline, trying cached pages");

        if let Some(cached) = self.lookup(namespace, &key).await {
            return FetchOutcome::new(strategy, cached);
        }

        if let Ok(home) = request.url.join(&self.config.home_url) {
            if let Some(cached) = self.lookup(namespace, &RequestKey::get(&home)).await {
                debug!(url = %request.url, home = %home, "Serving cached home page");
                return FetchOutcome::new(strategy, cached);
            }
        }

        FetchOutcome::new(strategy, offline_page_response())
    }

    async fn passthrough(&self, request: &Request) -> FetchOutcome {
        let response = match self.fetch(request).await {
            Ok(response) => response,
            Err(err) => {
                debug!(url = %request.url, error = %err, "Passthrough failed");
                Response::empty(StatusCode::SERVICE_UNAVAILABLE)
            }
        };
        FetchOutcome::new(StrategyKind::Passthrough, response)
    }

    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.fetcher.fetch(request).await
    }

    /// Look in `primary` first, then the other current namespace.
    /// Storage failures count as a miss.
    async fn lookup(&self, primary: &str, key: &RequestKey) -> Option<Response> {
        let secondary = if primary == self.config.api_cache {
            self.config.shell_cache.as_str()
        } else {
            self.config.api_cache.as_str()
        };

        match self.storage.match_in(&[primary, secondary], key).await {
            Ok(hit) => hit.map(|snapshot| snapshot.to_response()),
            Err(err) => {
                warn!(key = %key, category = err.category(), error = %err, "Cache lookup failed");
                None
            }
        }
    }

    async fn write_through(&self, namespace: &str, key: &RequestKey, response: &Response) {
        let snapshot = ResponseSnapshot::capture(response);
        store(&self.storage, namespace, key, &snapshot).await;
    }

    fn write_behind(
        &self,
        namespace: &str,
        key: RequestKey,
        response: &Response,
    ) -> BackgroundWrite {
        let snapshot = ResponseSnapshot::capture(response);
        let storage = self.storage.clone();
        let namespace = namespace.to_string();
        async move {
            store(&storage, &namespace, &key, &snapshot).await;
        }
        .boxed()
    }
}

async fn store(
    storage: &CacheStorage,
    namespace: &str,
    key: &RequestKey,
    snapshot: &ResponseSnapshot,
) {
    let result = match storage.open(namespace).await {
        Ok(cache) => cache.put(key, snapshot).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) => trace!(namespace, key = %key, "Response cached"),
        Err(err) => warn!(
            namespace,
            key = %key,
            category = err.category(),
            error = %err,
            "Failed to cache response"
        ),
    }
}
