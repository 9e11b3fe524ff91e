//! Scripted test doubles: a fetcher with a route table and an offline switch,
//! and a cache backend whose every operation fails.
//!
//! Shared by the unit tests and `tests/common`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use clamflow_cache::{CacheBackend, RequestKey, ResponseSnapshot};
use clamflow_common::{SwError, SwResult};
use clamflow_net::{Fetcher, NetError, Request, Response, ResponseSource};
use hashbrown::HashMap;
use http::{header, HeaderMap, HeaderValue, StatusCode};

struct Route {
    status: u16,
    content_type: Option<&'static str>,
    body: Bytes,
}

#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, status: u16, body: &str) {
        self.insert(url, status, None, body);
    }

    pub fn route_typed(&self, url: &str, status: u16, content_type: &'static str, body: &str) {
        self.insert(url, status, Some(content_type), body);
    }

    fn insert(&self, url: &str, status: u16, content_type: Option<&'static str>, body: &str) {
        self.routes.lock().unwrap().insert(
            url.to_string(),
            Route {
                status,
                content_type,
                body: Bytes::from(body.to_string()),
            },
        );
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(NetError::Offline);
        }
        let routes = self.routes.lock().unwrap();
        let Some(route) = routes.get(request.url.as_str()) else {
            return Ok(Response {
                url: Some(request.url.clone()),
                source: ResponseSource::Network,
                ..Response::empty(StatusCode::NOT_FOUND)
            });
        };

        let mut headers = HeaderMap::new();
        if let Some(content_type) = route.content_type {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        Ok(Response {
            url: Some(request.url.clone()),
            status: StatusCode::from_u16(route.status).unwrap(),
            headers,
            body: route.body.clone(),
            source: ResponseSource::Network,
        })
    }
}

/// Storage that is unreachable. Optionally still lists namespaces, so that
/// the deletes after a successful listing fail.
#[derive(Default)]
pub struct FailingBackend {
    listed: Option<Vec<String>>,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listing(names: &[&str]) -> Self {
        Self {
            listed: Some(names.iter().map(|n| n.to_string()).collect()),
        }
    }
}

fn unavailable<T>() -> SwResult<T> {
    Err(SwError::storage("storage unavailable"))
}

impl CacheBackend for FailingBackend {
    fn open(&self, _name: &str) -> SwResult<()> {
        unavailable()
    }

    fn has(&self, _name: &str) -> SwResult<bool> {
        unavailable()
    }

    fn names(&self) -> SwResult<Vec<String>> {
        match &self.listed {
            Some(names) => Ok(names.clone()),
            None => unavailable(),
        }
    }

    fn delete(&self, _name: &str) -> SwResult<bool> {
        unavailable()
    }

    fn get(&self, _name: &str, _key: &RequestKey) -> SwResult<Option<ResponseSnapshot>> {
        unavailable()
    }

    fn put(&self, _name: &str, _key: &RequestKey, _snapshot: &ResponseSnapshot) -> SwResult<()> {
        unavailable()
    }

    fn delete_entry(&self, _name: &str, _key: &RequestKey) -> SwResult<bool> {
        unavailable()
    }

    fn keys(&self, _name: &str) -> SwResult<Vec<RequestKey>> {
        unavailable()
    }
}
