// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache invalidation helpers and the read-through wrapper.
//!
//! Invalidation is best-effort: a failed clear is logged and counted but
//! never returned, so it cannot block the write that triggered it.
//! [`with_cache`] likewise hides every cache-layer error behind a direct
//! call to the query; a cache outage only makes reads slower.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use tracing::{debug, warn};

use crate::category::CacheCategory;
use crate::service::keys::TENANT_PREFIX;
use crate::service::CacheService;

/// Clear every cached entry of a content collection for one tenant.
///
/// Returns the number of entries removed (`0` when the clear failed).
pub async fn invalidate_collection_cache(
    cache: &CacheService,
    collection: &str,
    tenant_id: Option<&str>,
) -> u64 {
    let pattern = format!("collection:{}:*", collection);
    clear_best_effort(cache, &pattern, tenant_id).await
}

/// Clear every entry of a category, both `{category}:*` and `*:{category}:*`
/// shapes.
///
/// With `tenant_id` the clear is scoped to that tenant. Without one it
/// spans every tenant.
pub async fn invalidate_category_cache(
    cache: &CacheService,
    category: &CacheCategory,
    tenant_id: Option<&str>,
) -> u64 {
    let name = category.as_str();
    let patterns = match tenant_id {
        None if cache.is_multi_tenant() => vec![
            format!("{}*:{}:*", TENANT_PREFIX, name),
            format!("{}*:*:{}:*", TENANT_PREFIX, name),
        ],
        _ => vec![format!("{}:*", name), format!("*:{}:*", name)],
    };

    let mut cleared = 0;
    for pattern in &patterns {
        cleared += clear_best_effort(cache, pattern, tenant_id).await;
    }
    cleared
}

async fn clear_best_effort(cache: &CacheService, pattern: &str, tenant_id: Option<&str>) -> u64 {
    match cache.clear_by_pattern(pattern, tenant_id).await {
        Ok(cleared) => {
            debug!(pattern, tenant_id, cleared, "Cache invalidated");
            cleared
        }
        Err(e) => {
            warn!(pattern, tenant_id, error = %e, "Cache invalidation failed");
            0
        }
    }
}

/// Options for [`with_cache`].
#[derive(Debug, Clone, Default)]
pub struct WithCacheOptions {
    pub category: Option<CacheCategory>,
    pub tenant_id: Option<String>,
    /// `0` lets the category (or the global default) decide.
    pub ttl_secs: u64,
    /// Skip the lookup, recompute and overwrite.
    pub force_refresh: bool,
}

impl WithCacheOptions {
    pub fn category(category: CacheCategory) -> Self {
        Self {
            category: Some(category),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn for_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Read-through cache around `query_fn`.
///
/// A hit returns the cached value. A miss (or `force_refresh`) runs
/// `query_fn` and stores its result. Errors from `query_fn` propagate
/// unchanged; errors from the cache never do. A failed lookup falls back
/// to `query_fn` directly and a failed store still returns the computed value.
///
/// # Example
///
/// ```rust,no_run
/// # use tenant_cache::{CacheService, CacheCategory};
/// # use tenant_cache::invalidation::{with_cache, WithCacheOptions};
/// # async fn example(cache: &CacheService) -> Result<(), std::io::Error> {
/// let posts: Vec<String> = with_cache(
///     cache,
///     "collection:posts:list",
///     || async { Ok::<_, std::io::Error>(vec!["hello".to_string()]) },
///     WithCacheOptions::category(CacheCategory::Content).for_tenant("acme"),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn with_cache<T, E, F, Fut>(
    cache: &CacheService,
    key: &str,
    query_fn: F,
    options: WithCacheOptions,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let tenant_id = options.tenant_id.as_deref();
    let category = options.category.as_ref();

    if !options.force_refresh {
        match cache.get::<T>(key, tenant_id, category).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, querying directly");
                return query_fn().await;
            }
        }
    }

    let value = query_fn().await?;
    if let Err(e) = cache.set(key, &value, options.ttl_secs, tenant_id, category).await {
        warn!(key, error = %e, "Cache write failed, returning uncached value");
    }
    Ok(value)
}
