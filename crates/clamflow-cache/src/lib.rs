//! # ClamFlow Cache
//!
//! Named, versioned cache namespaces holding request → response snapshots.
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage (listNamespaces / open / delete)
//!     └── Cache (one namespace, e.g. "clamflow-shell-v1.0.1")
//!             └── RequestKey → ResponseSnapshot
//!
//! CacheBackend
//!     ├── MemoryBackend  (ephemeral)
//!     └── SqliteBackend  (persistent)
//! ```
//!
//! Entries are never evicted individually; a namespace lives until it is
//! deleted as a whole.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use clamflow_common::{SwError, SwResult};
use clamflow_net::{Request, Response, ResponseSource};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use url::Url;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

// ==================== Keys and Snapshots ====================

/// Normalized request identity: upper-case method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_ascii_uppercase(),
            url: url.to_string(),
        }
    }

    /// Key for a GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new(&Method::GET, url)
    }

    pub fn from_request(request: &Request) -> Self {
        Self::new(&request.method, &request.url)
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Immutable capture of a response taken at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    /// Final URL of the response, if it came from the network.
    pub url: Option<String>,
    pub status: u16,
    /// Header values kept as raw bytes; not every value is visible ASCII.
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
    /// Capture time (ms since epoch).
    pub cached_at: i64,
}

impl ResponseSnapshot {
    pub fn capture(response: &Response) -> Self {
        Self {
            url: response.url.as_ref().map(|u| u.to_string()),
            status: response.status.as_u16(),
            headers: response
                .headers
                .iter()
                .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
                .collect(),
            body: response.body.to_vec(),
            cached_at: Utc::now().timestamp_millis(),
        }
    }

    /// Rebuild a response marked as served from cache.
    pub fn to_response(&self) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(n), Ok(v)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::from_bytes(value),
            ) {
                headers.append(n, v);
            }
        }
        Response {
            url: self.url.as_deref().and_then(|u| Url::parse(u).ok()),
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers,
            body: Bytes::from(self.body.clone()),
            source: ResponseSource::Cache,
        }
    }
}

// ==================== Backend ====================

/// Persistent key → response storage facility.
///
/// Every call is a single atomic operation; no transaction spans calls.
pub trait CacheBackend: Send + Sync {
    /// Create the namespace if absent.
    fn open(&self, name: &str) -> SwResult<()>;

    fn has(&self, name: &str) -> SwResult<bool>;

    /// All namespace names, sorted.
    fn names(&self) -> SwResult<Vec<String>>;

    /// Remove a namespace and all its entries. Returns whether it existed.
    fn delete(&self, name: &str) -> SwResult<bool>;

    /// Look up an entry. An absent namespace is a miss.
    fn get(&self, name: &str, key: &RequestKey) -> SwResult<Option<ResponseSnapshot>>;

    /// Insert or overwrite an entry, creating the namespace if needed.
    fn put(&self, name: &str, key: &RequestKey, snapshot: &ResponseSnapshot) -> SwResult<()>;

    fn delete_entry(&self, name: &str, key: &RequestKey) -> SwResult<bool>;

    fn keys(&self, name: &str) -> SwResult<Vec<RequestKey>>;
}

// ==================== Cache Storage ====================

/// Handle over all namespaces (the `caches` global).
#[derive(Clone)]
pub struct CacheStorage {
    backend: Arc<dyn CacheBackend>,
}

impl CacheStorage {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// Storage kept in memory for the lifetime of the process.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Open a namespace (creates if it doesn't exist).
    pub async fn open(&self, name: &str) -> SwResult<Cache> {
        if name.is_empty() {
            return Err(SwError::cache("namespace name must not be empty"));
        }
        self.backend.open(name)?;
        Ok(Cache {
            name: name.to_string(),
            backend: Arc::clone(&self.backend),
        })
    }

    /// Check if a namespace exists.
    pub async fn has(&self, name: &str) -> SwResult<bool> {
        self.backend.has(name)
    }

    /// List all namespace names.
    pub async fn keys(&self) -> SwResult<Vec<String>> {
        self.backend.names()
    }

    /// Delete a namespace.
    pub async fn delete(&self, name: &str) -> SwResult<bool> {
        let deleted = self.backend.delete(name)?;
        debug!(namespace = name, deleted, "Namespace delete");
        Ok(deleted)
    }

    /// Look up `key` in each namespace in order; first hit wins.
    pub async fn match_in(
        &self,
        names: &[&str],
        key: &RequestKey,
    ) -> SwResult<Option<ResponseSnapshot>> {
        for name in names {
            if let Some(snapshot) = self.backend.get(name, key)? {
                trace!(namespace = *name, key = %key, "Cache hit");
                return Ok(Some(snapshot));
            }
        }
        trace!(key = %key, "Cache miss");
        Ok(None)
    }
}

impl fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStorage").finish_non_exhaustive()
    }
}

/// One opened namespace.
#[derive(Clone)]
pub struct Cache {
    name: String,
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Match a request.
    pub async fn match_request(&self, key: &RequestKey) -> SwResult<Option<ResponseSnapshot>> {
        self.backend.get(&self.name, key)
    }

    /// Add or overwrite an entry.
    pub async fn put(&self, key: &RequestKey, snapshot: &ResponseSnapshot) -> SwResult<()> {
        self.backend.put(&self.name, key, snapshot)?;
        trace!(namespace = %self.name, key = %key, status = snapshot.status, "Cache put");
        Ok(())
    }

    /// Delete an entry.
    pub async fn delete(&self, key: &RequestKey) -> SwResult<bool> {
        self.backend.delete_entry(&self.name, key)
    }

    /// All keys in this namespace.
    pub async fn keys(&self) -> SwResult<Vec<RequestKey>> {
        self.backend.keys(&self.name)
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache").field("name", &self.name).finish()
    }
}
