// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache service facade.
//!
//! The [`CacheService`] ties the pieces together:
//! - tenant key namespacing
//! - TTL resolution through the category policy
//! - lazy, single-flight backend initialization
//! - access logging and background prefetch on reads
//! - metrics recording
//!
//! Construct one instance at startup and share it behind an `Arc`.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized → Initializing → Ready
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenant_cache::{CacheCategory, CacheConfig, CacheService, EnvSettings};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), tenant_cache::CacheError> {
//! let settings = Arc::new(EnvSettings);
//! let config = CacheConfig::from_settings(settings.as_ref());
//! let cache = CacheService::new(config, settings)?;
//!
//! cache.set("collection:posts:1", &serde_json::json!({"title": "Hello"}), 0, Some("acme"), Some(&CacheCategory::Content)).await?;
//! let post: Option<serde_json::Value> = cache.get("collection:posts:1", Some("acme"), Some(&CacheCategory::Content)).await?;
//! assert!(post.is_some());
//!
//! cache.disconnect().await?;
//! # Ok(())
//! # }
//! ```

mod analytics;
mod api;
pub mod keys;
mod lifecycle;
mod prefetch;
pub mod types;

pub use types::{
    BoxError, FetchedValues, KeyAccessStats, PrefetchPattern, ServiceState, WarmCacheConfig,
    WarmCacheEntry, WarmCacheReport,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;

use crate::category::{CacheCategory, TtlPolicy};
use crate::config::{CacheConfig, SettingsProvider};
use crate::metrics::CacheMetrics;
use crate::resilience::connector::ResilienceStats;
use crate::storage::create_backend;
use crate::storage::traits::{CacheBackend, CacheResult};
use lifecycle::InitFlight;
use prefetch::Prefetcher;

/// Access timestamps kept per key.
pub const ACCESS_LOG_CAPACITY: usize = 100;

/// Tenant-aware cache facade over a [`CacheBackend`].
pub struct CacheService {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
    ttl_policy: TtlPolicy,
    metrics: Arc<CacheMetrics>,

    state: Arc<watch::Sender<ServiceState>>,
    state_rx: watch::Receiver<ServiceState>,
    /// The initialization every concurrent caller awaits; empty when none is running
    init_flight: Arc<Mutex<Option<InitFlight>>>,

    /// Per physical key, oldest first
    access_log: DashMap<String, VecDeque<DateTime<Utc>>>,
    prefetcher: Prefetcher,
}

impl CacheService {
    /// Build a service with the backend selected by `config`.
    ///
    /// Nothing is connected until the first operation.
    pub fn new(config: CacheConfig, settings: Arc<dyn SettingsProvider>) -> CacheResult<Self> {
        let backend = create_backend(&config)?;
        Ok(Self::with_backend(config, settings, backend))
    }

    /// Build a service over an explicit backend.
    pub fn with_backend(
        config: CacheConfig,
        settings: Arc<dyn SettingsProvider>,
        backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let ttl_policy = TtlPolicy::new(settings, config.default_ttl_secs);
        let metrics = Arc::new(CacheMetrics::new());
        let (state, state_rx) = watch::channel(ServiceState::Uninitialized);
        let prefetcher = Prefetcher::new(
            Arc::clone(&backend),
            ttl_policy.clone(),
            Arc::clone(&metrics),
            config.multi_tenant,
        );

        Self {
            config,
            backend,
            ttl_policy,
            metrics,
            state: Arc::new(state),
            state_rx,
            init_flight: Arc::new(Mutex::new(None)),
            access_log: DashMap::new(),
            prefetcher,
        }
    }

    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ServiceState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[must_use]
    pub fn is_multi_tenant(&self) -> bool {
        self.config.multi_tenant
    }

    /// Name of the active backend ("local" or "redis").
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Connection retry statistics of the backend, if it dials out.
    #[must_use]
    pub fn connector_stats(&self) -> Option<ResilienceStats> {
        self.backend.connector_stats()
    }

    /// Effective TTL in seconds for `category`.
    #[must_use]
    pub fn get_category_ttl(&self, category: &CacheCategory) -> u64 {
        self.ttl_policy.category_ttl(category)
    }

    /// Effective TTL for every built-in category, overrides applied.
    #[must_use]
    pub fn get_current_ttl_config(&self) -> BTreeMap<CacheCategory, u64> {
        self.ttl_policy.current_config()
    }

    /// Append a prefetch pattern. Patterns are evaluated in registration order.
    pub fn register_prefetch_pattern(&self, pattern: PrefetchPattern) {
        self.prefetcher.register(pattern);
    }

    #[must_use]
    pub fn prefetch_pattern_count(&self) -> usize {
        self.prefetcher.len()
    }
}
