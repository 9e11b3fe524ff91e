//! Worker configuration
//!
//! The deploy-time constants the worker depends on. A new deploy bumps the
//! namespace names, which makes every older namespace stale on activation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::{SwError, SwResult};

/// Worker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin the worker is registered for
    pub origin: String,

    /// Current namespace for static shell assets and pages
    pub shell_cache: String,

    /// Current namespace for API responses
    pub api_cache: String,

    /// Paths populated into the shell namespace at install time
    pub precache_urls: Vec<String>,

    /// Backend hosts whose requests are always treated as API traffic
    pub backend_hosts: Vec<String>,

    /// Path prefixes routed network-first into the API namespace
    pub api_prefixes: Vec<String>,

    /// Path prefixes of build-artifact bundles, routed network-first
    pub asset_prefixes: Vec<String>,

    /// File extensions (without the dot) served cache-first
    pub cache_first_extensions: Vec<String>,

    /// Navigation fallback of last resort
    pub home_url: String,

    /// Tag acknowledged by the background sync handler
    pub sync_tag: String,

    /// Push notification defaults
    pub notification: NotificationDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    /// Title used when the payload carries none
    pub default_title: String,

    /// Body used when the push carries no payload at all
    pub default_body: String,

    /// Icon path
    pub icon: String,

    /// Badge path
    pub badge: String,

    /// Vibration pattern in milliseconds
    pub vibrate: Vec<u32>,

    /// Click target when the notification carries no usable same-origin URL
    pub default_url: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            shell_cache: "clamflow-shell-v1.0.1".to_string(),
            api_cache: "clamflow-api-v1.0.1".to_string(),
            precache_urls: ["/", "/login", "/dashboard", "/manifest.json", "/logo-relish.png"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            backend_hosts: vec!["clamflowbackend-production.up.railway.app".to_string()],
            api_prefixes: [
                "/api/",
                "/auth/",
                "/health",
                "/dashboard",
                "/super-admin/",
                "/notifications/",
                "/audit/",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            asset_prefixes: vec!["/_next/".to_string()],
            cache_first_extensions: [
                "png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "avif", "woff", "woff2", "ttf",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            home_url: "/".to_string(),
            sync_tag: "background-sync".to_string(),
            notification: NotificationDefaults::default(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            default_title: "ClamFlow".to_string(),
            default_body: "New ClamFlow notification".to_string(),
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/icon-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            default_url: "/dashboard".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Load and validate a configuration from a JSON file.
    pub fn load(path: &Path) -> SwResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse and validate a configuration from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> SwResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the worker relies on.
    pub fn validate(&self) -> SwResult<()> {
        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(SwError::config(format!(
                "origin must be http or https, got {}",
                origin.scheme()
            )));
        }
        if self.shell_cache.trim().is_empty() || self.api_cache.trim().is_empty() {
            return Err(SwError::config("cache namespace names must not be empty"));
        }
        if self.shell_cache == self.api_cache {
            return Err(SwError::config(format!(
                "shell and api namespaces must differ (both are {})",
                self.shell_cache
            )));
        }
        for path in &self.precache_urls {
            self.resolve(path)?;
        }
        self.resolve(&self.home_url)?;
        Ok(())
    }

    /// The configured origin as a URL.
    pub fn origin_url(&self) -> SwResult<Url> {
        Url::parse(&self.origin).map_err(|e| SwError::config(format!("invalid origin: {}", e)))
    }

    /// Resolve a path (or absolute URL) against the origin.
    pub fn resolve(&self, path: &str) -> SwResult<Url> {
        Ok(self.origin_url()?.join(path)?)
    }

    /// The namespaces that survive activation.
    pub fn current_namespaces(&self) -> [&str; 2] {
        [self.shell_cache.as_str(), self.api_cache.as_str()]
    }

    /// Whether a namespace belongs to the current deploy.
    pub fn is_current_namespace(&self, name: &str) -> bool {
        self.current_namespaces().contains(&name)
    }
}
