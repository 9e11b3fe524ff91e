//! Request classification.
//!
//! An ordered rule table maps every intercepted request to exactly one
//! caching strategy. Rules are evaluated top to bottom and the first match
//! wins; a request no rule matches is passed through.

use std::fmt;

use clamflow_common::WorkerConfig;
use clamflow_net::Request;
use http::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Caching strategy applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Network first, API namespace, JSON 503 fallback.
    NetworkFirstApi,
    /// Network first, shell namespace, empty 503 fallback.
    NetworkFirstAsset,
    /// Cache first, network on miss, empty 404 fallback.
    CacheFirst,
    /// Network first, then same page, then home, then "Offline".
    NavigationFallback,
    /// Forwarded untouched.
    Passthrough,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::NetworkFirstApi => "network-first-api",
            StrategyKind::NetworkFirstAsset => "network-first-asset",
            StrategyKind::CacheFirst => "cache-first",
            StrategyKind::NavigationFallback => "navigation-fallback",
            StrategyKind::Passthrough => "passthrough",
        };
        f.write_str(name)
    }
}

/// What a rule checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatch {
    /// Any method other than GET.
    NonGetMethod,
    /// Any scheme other than http/https.
    NonHttpScheme,
    /// URL path starts with the prefix.
    PathPrefix(String),
    /// URL host equals the given host (case-insensitive).
    Host(String),
    /// Last path segment ends in one of the extensions (lower-case, no dot).
    Extension(Vec<String>),
    /// Top-level document fetch.
    Navigation,
}

impl RuleMatch {
    pub fn matches(&self, request: &Request) -> bool {
        let url = &request.url;
        match self {
            RuleMatch::NonGetMethod => request.method != Method::GET,
            RuleMatch::NonHttpScheme => !matches!(url.scheme(), "http" | "https"),
            RuleMatch::PathPrefix(prefix) => url.path().starts_with(prefix.as_str()),
            RuleMatch::Host(host) => url
                .host_str()
                .map(|h| h.eq_ignore_ascii_case(host))
                .unwrap_or(false),
            RuleMatch::Extension(extensions) => path_extension(url.path())
                .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
                .unwrap_or(false),
            RuleMatch::Navigation => request.is_navigation(),
        }
    }
}

/// Extension of the last path segment, if it has one.
fn path_extension(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

/// A predicate → strategy mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    pub matcher: RuleMatch,
    pub strategy: StrategyKind,
}

impl ClassificationRule {
    pub fn new(matcher: RuleMatch, strategy: StrategyKind) -> Self {
        Self { matcher, strategy }
    }
}

/// Ordered rule table, fixed for the worker's lifetime.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<ClassificationRule>,
}

impl Classifier {
    /// Build the rule table from explicit rules.
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// Build the production rule table from the worker configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        let mut rules = vec![
            ClassificationRule::new(RuleMatch::NonGetMethod, StrategyKind::Passthrough),
            ClassificationRule::new(RuleMatch::NonHttpScheme, StrategyKind::Passthrough),
        ];

        rules.extend(config.api_prefixes.iter().map(|prefix| {
            ClassificationRule::new(
                RuleMatch::PathPrefix(prefix.clone()),
                StrategyKind::NetworkFirstApi,
            )
        }));
        rules.extend(config.backend_hosts.iter().map(|host| {
            ClassificationRule::new(RuleMatch::Host(host.clone()), StrategyKind::NetworkFirstApi)
        }));
        rules.extend(config.asset_prefixes.iter().map(|prefix| {
            ClassificationRule::new(
                RuleMatch::PathPrefix(prefix.clone()),
                StrategyKind::NetworkFirstAsset,
            )
        }));

        if !config.cache_first_extensions.is_empty() {
            rules.push(ClassificationRule::new(
                RuleMatch::Extension(
                    config
                        .cache_first_extensions
                        .iter()
                        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                        .collect(),
                ),
                StrategyKind::CacheFirst,
            ));
        }

        rules.push(ClassificationRule::new(
            RuleMatch::Navigation,
            StrategyKind::NavigationFallback,
        ));

        Self::new(rules)
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Classify a request. Total: unmatched requests are passed through.
    pub fn classify(&self, request: &Request) -> StrategyKind {
        let strategy = self
            .rules
            .iter()
            .find(|rule| rule.matcher.matches(request))
            .map(|rule| rule.strategy)
            .unwrap_or(StrategyKind::Passthrough);

        debug!(
            url = %request.url,
            method = %request.method,
            strategy = %strategy,
            "Request classified"
        );
        strategy
    }
}
