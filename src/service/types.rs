// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the cache service.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::category::CacheCategory;
use crate::storage::traits::{CacheError, CacheResult};

/// Service lifecycle state.
///
/// ```text
/// Uninitialized → Initializing → Ready
/// ```
///
/// Use [`super::CacheService::state()`] to check the current state or
/// [`super::CacheService::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// Backend not initialized yet (or disconnected)
    Uninitialized,
    /// First caller is running `backend.initialize()`
    Initializing,
    /// Backend is usable
    Ready,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Ready => write!(f, "Ready"),
        }
    }
}

/// Error type returned by prefetch fetchers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Values loaded by a fetcher, keyed by base key.
pub type FetchedValues = HashMap<String, serde_json::Value>;

pub type PrefetchKeysFn = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

pub type PrefetchFetcher =
    Arc<dyn Fn(Vec<String>) -> BoxFuture<'static, Result<FetchedValues, BoxError>> + Send + Sync>;

/// Rule that populates related keys in the background when a matching key is read.
///
/// Patterns are matched against the caller's base key (before tenant
/// namespacing). Derived keys are base keys too and are stored under the
/// same tenant as the read that triggered them.
///
/// # Example
///
/// ```rust
/// use tenant_cache::{CacheCategory, PrefetchPattern};
///
/// let pattern = PrefetchPattern::new(r"^collection:posts:\d+$")
///     .unwrap()
///     .with_keys(|key| vec![format!("{}:comments", key)])
///     .with_category(CacheCategory::Content);
/// assert!(pattern.matches("collection:posts:7"));
/// ```
#[derive(Clone)]
pub struct PrefetchPattern {
    pub(crate) regex: Regex,
    pub(crate) prefetch_keys: PrefetchKeysFn,
    pub(crate) fetcher: Option<PrefetchFetcher>,
    pub(crate) category: Option<CacheCategory>,
    pub(crate) ttl_secs: Option<u64>,
}

impl PrefetchPattern {
    /// Compile a pattern from a regular expression.
    pub fn new(pattern: &str) -> CacheResult<Self> {
        let regex = Regex::new(pattern).map_err(|e| CacheError::Pattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            regex,
            prefetch_keys: Arc::new(|_| Vec::new()),
            fetcher: None,
            category: None,
            ttl_secs: None,
        })
    }

    /// Derive related base keys from the key that was read.
    #[must_use]
    pub fn with_keys<F>(mut self, derive: F) -> Self
    where
        F: Fn(&str) -> Vec<String> + Send + Sync + 'static,
    {
        self.prefetch_keys = Arc::new(derive);
        self
    }

    /// Load values for the related keys that are not cached yet.
    ///
    /// Called at most once per triggering read, with every missing key.
    #[must_use]
    pub fn with_fetcher<F, Fut>(mut self, fetcher: F) -> Self
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<FetchedValues, BoxError>> + Send + 'static,
    {
        self.fetcher = Some(Arc::new(move |keys| fetcher(keys).boxed()));
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: CacheCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Explicit TTL for prefetched values; otherwise the category decides.
    #[must_use]
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }

    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    #[must_use]
    pub fn category(&self) -> Option<&CacheCategory> {
        self.category.as_ref()
    }

    pub(crate) fn related_keys(&self, key: &str) -> Vec<String> {
        (self.prefetch_keys)(key)
    }
}

impl fmt::Debug for PrefetchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefetchPattern")
            .field("pattern", &self.regex.as_str())
            .field("has_fetcher", &self.fetcher.is_some())
            .field("category", &self.category)
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

/// One value to preload.
#[derive(Debug, Clone)]
pub struct WarmCacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    /// `0` lets the category (or the global default) decide.
    pub ttl_secs: u64,
    pub category: Option<CacheCategory>,
}

impl WarmCacheEntry {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
            ttl_secs: 0,
            category: None,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: CacheCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Batch of entries to preload for one tenant.
#[derive(Debug, Clone, Default)]
pub struct WarmCacheConfig {
    pub entries: Vec<WarmCacheEntry>,
    pub tenant_id: Option<String>,
    /// Leave keys that are already cached untouched.
    pub skip_existing: bool,
}

/// Outcome of [`super::CacheService::warm_cache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmCacheReport {
    pub warmed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Access statistics for one physical key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyAccessStats {
    pub key: String,
    /// Accesses held in the window (at most 100).
    pub count: usize,
    pub first_access: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub accesses_per_minute: f64,
}
