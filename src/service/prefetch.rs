// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Background prefetch of related keys.
//!
//! A read whose base key matches a registered pattern spawns a detached
//! task. The task derives related keys, checks which are missing, and calls
//! the pattern's fetcher once for all of them. The triggering read never
//! waits on any of this, and dropping it does not cancel the task. Failures
//! are logged and counted, never returned.

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::keys::namespace_key;
use super::types::PrefetchPattern;
use crate::category::TtlPolicy;
use crate::metrics::CacheMetrics;
use crate::storage::traits::{CacheBackend, CacheError, CacheResult};

#[derive(Clone)]
pub(crate) struct Prefetcher {
    /// Append-only, read on every lookup
    patterns: Arc<RwLock<Vec<Arc<PrefetchPattern>>>>,
    backend: Arc<dyn CacheBackend>,
    ttl_policy: TtlPolicy,
    metrics: Arc<CacheMetrics>,
    multi_tenant: bool,
}

impl Prefetcher {
    pub(crate) fn new(
        backend: Arc<dyn CacheBackend>,
        ttl_policy: TtlPolicy,
        metrics: Arc<CacheMetrics>,
        multi_tenant: bool,
    ) -> Self {
        Self {
            patterns: Arc::new(RwLock::new(Vec::new())),
            backend,
            ttl_policy,
            metrics,
            multi_tenant,
        }
    }

    pub(crate) fn register(&self, pattern: PrefetchPattern) {
        debug!(pattern = %pattern.as_str(), "Registered prefetch pattern");
        self.patterns.write().push(Arc::new(pattern));
    }

    pub(crate) fn len(&self) -> usize {
        self.patterns.read().len()
    }

    /// Spawn prefetch work for every pattern matching `base_key`.
    pub(crate) fn trigger(&self, base_key: &str, tenant_id: Option<&str>) {
        let matched: Vec<Arc<PrefetchPattern>> = self
            .patterns
            .read()
            .iter()
            .filter(|p| p.fetcher.is_some() && p.matches(base_key))
            .cloned()
            .collect();
        if matched.is_empty() {
            return;
        }

        let this = self.clone();
        let base_key = base_key.to_string();
        let tenant_id = tenant_id.map(str::to_string);
        tokio::spawn(async move {
            for pattern in matched {
                match this.run(&pattern, &base_key, tenant_id.as_deref()).await {
                    Ok(0) => {}
                    Ok(stored) => debug!(key = %base_key, stored, "Prefetched related keys"),
                    Err(e) => {
                        warn!(key = %base_key, pattern = %pattern.as_str(), error = %e, "Prefetch failed");
                        this.metrics.record_error(
                            "prefetch",
                            &base_key,
                            pattern.category().map(|c| c.as_str()),
                        );
                    }
                }
            }
        });
    }

    async fn run(&self, pattern: &PrefetchPattern, base_key: &str, tenant_id: Option<&str>) -> CacheResult<usize> {
        let Some(fetcher) = pattern.fetcher.as_ref() else {
            return Ok(0);
        };

        let mut missing = Vec::new();
        for key in pattern.related_keys(base_key) {
            if key == base_key || missing.contains(&key) {
                continue;
            }
            let physical = namespace_key(&key, tenant_id, self.multi_tenant);
            if self.backend.get(&physical).await?.is_none() {
                missing.push(key);
            }
        }
        if missing.is_empty() {
            return Ok(0);
        }

        let fetched = fetcher(missing.clone())
            .await
            .map_err(|e| CacheError::Backend(format!("prefetch fetcher failed: {}", e)))?;

        let ttl_secs = self
            .ttl_policy
            .resolve(pattern.ttl_secs.unwrap_or(0), pattern.category.as_ref());
        let category = pattern.category().map(|c| c.as_str());

        let mut stored = 0;
        for (key, value) in fetched {
            if !missing.contains(&key) {
                continue;
            }
            let physical = namespace_key(&key, tenant_id, self.multi_tenant);
            let raw = serde_json::to_string(&value)?;
            self.backend.set(&physical, &raw, Duration::from_secs(ttl_secs)).await?;
            self.metrics.record_set(&physical, category, tenant_id, ttl_secs);
            stored += 1;
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use crate::category::CacheCategory;
    use crate::config::CacheConfig;
    use crate::service::{BoxError, CacheService, FetchedValues, PrefetchPattern};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn service(multi_tenant: bool) -> CacheService {
        let settings: Arc<HashMap<String, String>> = Arc::new(HashMap::new());
        let config = CacheConfig {
            multi_tenant,
            ..Default::default()
        };
        CacheService::new(config, settings).unwrap()
    }

    fn comments_pattern(calls: Arc<AtomicUsize>) -> PrefetchPattern {
        PrefetchPattern::new(r"^post:\d+$")
            .unwrap()
            .with_keys(|key| vec![format!("{}:comments", key), format!("{}:author", key)])
            .with_category(CacheCategory::Content)
            .with_fetcher(move |keys: Vec<String>| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let values: FetchedValues =
                        keys.into_iter().map(|k| (k.clone(), json!({ "for": k }))).collect();
                    Ok::<_, BoxError>(values)
                }
            })
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_matching_read_prefetches_missing_keys() {
        let cache = service(true);
        let calls = Arc::new(AtomicUsize::new(0));
        cache.register_prefetch_pattern(comments_pattern(Arc::clone(&calls)));
        assert_eq!(cache.prefetch_pattern_count(), 1);

        cache.set("post:1:author", &json!("cached"), 60, Some("t1"), None).await.unwrap();
        let _: Option<serde_json::Value> = cache.get("post:1", Some("t1"), None).await.unwrap();

        wait_for(|| calls.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let comments: Option<serde_json::Value> =
            cache.get("post:1:comments", Some("t1"), None).await.unwrap();
        assert_eq!(comments, Some(json!({ "for": "post:1:comments" })));

        // Already cached value was not overwritten
        let author: Option<serde_json::Value> = cache.get("post:1:author", Some("t1"), None).await.unwrap();
        assert_eq!(author, Some(json!("cached")));

        // Other tenants are untouched
        let other: Option<serde_json::Value> =
            cache.get("post:1:comments", Some("t2"), None).await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_fetcher_skipped_when_nothing_missing() {
        let cache = service(false);
        let calls = Arc::new(AtomicUsize::new(0));
        cache.register_prefetch_pattern(comments_pattern(Arc::clone(&calls)));

        cache.set("post:2:comments", "c", 60, None, None).await.unwrap();
        cache.set("post:2:author", "a", 60, None, None).await.unwrap();
        let _: Option<String> = cache.get("post:2", None, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetcher_failure_is_only_counted() {
        let cache = service(false);
        cache.register_prefetch_pattern(
            PrefetchPattern::new("^report$")
                .unwrap()
                .with_keys(|_| vec!["report:details".to_string()])
                .with_fetcher(|_keys: Vec<String>| async { Err::<FetchedValues, BoxError>("upstream down".into()) }),
        );

        let value: Option<String> = cache.get("report", None, None).await.unwrap();
        assert!(value.is_none());

        let metrics = Arc::clone(cache.metrics());
        wait_for(|| metrics.get_snapshot(false).errors == 1).await;
        assert_eq!(metrics.get_snapshot(false).errors, 1);
    }

    #[tokio::test]
    async fn test_prefetch_disabled() {
        let settings: Arc<HashMap<String, String>> = Arc::new(HashMap::new());
        let config = CacheConfig {
            prefetch_enabled: false,
            ..Default::default()
        };
        let cache = CacheService::new(config, settings).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        cache.register_prefetch_pattern(comments_pattern(Arc::clone(&calls)));

        let _: Option<String> = cache.get("post:3", None, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
