// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Tenant Cache
//!
//! A tenant-aware caching layer for a content backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       CacheService                          │
//! │  • Tenant key namespacing (tenant:{id}:...)                 │
//! │  • Category TTL policy with per-category overrides          │
//! │  • Lazy single-flight initialization                        │
//! │  • Access analytics + background prefetch                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                    (Arc<dyn CacheBackend>)
//!                              ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────┐
//! │         LocalStore           │  │       RemoteStore        │
//! │  • DashMap + expiry sweeper  │  │  • Redis SET EX / SCAN   │
//! │  • Lazy eviction on read     │  │  • ResilientConnector    │
//! └──────────────────────────────┘  └──────────────────────────┘
//! ```
//!
//! Around the service sit [`CacheMetrics`] (hit/miss statistics with a
//! Prometheus text export) and the [`invalidation`] helpers, including the
//! read-through [`with_cache`] wrapper.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenant_cache::{CacheCategory, CacheConfig, CacheService, EnvSettings};
//! use tenant_cache::invalidation::invalidate_collection_cache;
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = Arc::new(EnvSettings);
//!     let config = CacheConfig {
//!         use_redis: true,
//!         redis_url: Some("redis://localhost:6379".into()),
//!         multi_tenant: true,
//!         ..Default::default()
//!     };
//!     let cache = CacheService::new(config, settings).expect("invalid cache config");
//!
//!     cache
//!         .set_with_category("collection:posts:list", &vec!["a", "b"], &CacheCategory::Content, Some("acme"), None)
//!         .await
//!         .expect("cache write failed");
//!
//!     let posts: Option<Vec<String>> = cache
//!         .get("collection:posts:list", Some("acme"), Some(&CacheCategory::Content))
//!         .await
//!         .expect("cache read failed");
//!     println!("{:?}", posts);
//!
//!     invalidate_collection_cache(&cache, "posts", Some("acme")).await;
//!     println!("{}", cache.metrics().export_prometheus_format());
//!
//!     cache.disconnect().await.ok();
//! }
//! ```

pub mod category;
pub mod config;
pub mod invalidation;
pub mod metrics;
pub mod resilience;
pub mod service;
pub mod storage;

pub use category::{CacheCategory, TtlPolicy};
pub use config::{CacheConfig, EnvSettings, SettingsProvider};
pub use invalidation::{invalidate_category_cache, invalidate_collection_cache, with_cache, WithCacheOptions};
pub use self::metrics::{CacheEvent, CacheEventKind, CacheMetrics, MetricsSnapshot};
pub use resilience::connector::{ResilienceStats, ResilientConnector};
pub use resilience::retry::RetryConfig;
pub use service::{
    CacheService, KeyAccessStats, PrefetchPattern, ServiceState, WarmCacheConfig, WarmCacheEntry,
    WarmCacheReport,
};
pub use storage::memory::LocalStore;
pub use storage::redis::RemoteStore;
pub use storage::traits::{CacheBackend, CacheError, CacheResult};
