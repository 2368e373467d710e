// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read, write and removal operations.
//!
//! Every call namespaces its key, makes sure the backend is initialized,
//! then delegates. Backend errors propagate to the caller; metrics, access
//! logging and prefetch never fail a call.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::category::CacheCategory;
use crate::metrics::LatencyTimer;
use crate::storage::traits::CacheResult;

use super::{CacheService, WarmCacheConfig, WarmCacheReport};

impl CacheService {
    // ═══════════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════════

    /// Fetch and decode the value stored under `key` for `tenant_id`.
    ///
    /// Records the access, fires any matching prefetch pattern in the
    /// background and records a hit or miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
        tenant_id: Option<&str>,
        category: Option<&CacheCategory>,
    ) -> CacheResult<Option<T>> {
        self.ensure_initialized().await?;

        let timer = LatencyTimer::start();
        let physical = self.generate_key(key, tenant_id);
        let label = category.map(CacheCategory::as_str);

        self.record_access(&physical);
        if self.config.prefetch_enabled {
            self.prefetcher.trigger(key, tenant_id);
        }

        let raw = match self.backend.get(&physical).await {
            Ok(raw) => raw,
            Err(e) => {
                self.metrics.record_error("get", &physical, label);
                return Err(e);
            }
        };

        match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.metrics.record_hit(&physical, label, tenant_id, Some(timer.elapsed_ms()));
                    debug!(key = %physical, "Cache hit");
                    Ok(Some(value))
                }
                Err(e) => {
                    self.metrics.record_error("get", &physical, label);
                    Err(e.into())
                }
            },
            None => {
                self.metrics.record_miss(&physical, label, tenant_id, Some(timer.elapsed_ms()));
                debug!(key = %physical, "Cache miss");
                Ok(None)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════════

    /// Store `value` under `key` for `tenant_id`.
    ///
    /// A `ttl_secs` of `0` resolves through the category policy (or the
    /// global default without a category), so nothing is ever stored
    /// without an expiry.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
        tenant_id: Option<&str>,
        category: Option<&CacheCategory>,
    ) -> CacheResult<()> {
        self.ensure_initialized().await?;

        let physical = self.generate_key(key, tenant_id);
        let label = category.map(CacheCategory::as_str);
        let ttl = self.ttl_policy.resolve(ttl_secs, category);
        let raw = serde_json::to_string(value)?;

        if let Err(e) = self.backend.set(&physical, &raw, Duration::from_secs(ttl)).await {
            self.metrics.record_error("set", &physical, label);
            return Err(e);
        }

        self.metrics.record_set(&physical, label, tenant_id, ttl);
        debug!(key = %physical, ttl_secs = ttl, "Cache set");
        Ok(())
    }

    /// Store `value` with the category's TTL unless `ttl_secs` overrides it.
    pub async fn set_with_category<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        category: &CacheCategory,
        tenant_id: Option<&str>,
        ttl_secs: Option<u64>,
    ) -> CacheResult<()> {
        self.set(key, value, ttl_secs.unwrap_or(0), tenant_id, Some(category))
            .await
    }

    /// Preload many entries. Per-entry failures are logged and counted.
    pub async fn warm_cache(&self, config: WarmCacheConfig) -> CacheResult<WarmCacheReport> {
        self.ensure_initialized().await?;

        let tenant_id = config.tenant_id.as_deref();
        let mut report = WarmCacheReport::default();

        for entry in &config.entries {
            if config.skip_existing {
                let physical = self.generate_key(&entry.key, tenant_id);
                if let Ok(Some(_)) = self.backend.get(&physical).await {
                    report.skipped += 1;
                    continue;
                }
            }

            match self
                .set(&entry.key, &entry.value, entry.ttl_secs, tenant_id, entry.category.as_ref())
                .await
            {
                Ok(()) => report.warmed += 1,
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "Failed to warm cache entry");
                    report.failed += 1;
                }
            }
        }

        debug!(
            warmed = report.warmed,
            skipped = report.skipped,
            failed = report.failed,
            "Cache warm complete"
        );
        Ok(report)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Removal
    // ═══════════════════════════════════════════════════════════════════════════

    /// Remove one key. Returns whether it existed.
    pub async fn delete(&self, key: &str, tenant_id: Option<&str>) -> CacheResult<bool> {
        Ok(self.delete_many(&[key], tenant_id).await? > 0)
    }

    /// Remove several keys, returning how many existed.
    pub async fn delete_many<K: AsRef<str>>(&self, keys: &[K], tenant_id: Option<&str>) -> CacheResult<u64> {
        self.ensure_initialized().await?;

        let physical: Vec<String> = keys
            .iter()
            .map(|k| self.generate_key(k.as_ref(), tenant_id))
            .collect();

        let deleted = match self.backend.delete(&physical).await {
            Ok(n) => n,
            Err(e) => {
                self.metrics.record_error("delete", &physical.join(","), None);
                return Err(e);
            }
        };

        for key in &physical {
            self.metrics.record_delete(key, tenant_id);
        }
        self.forget_access(&physical);
        debug!(requested = physical.len(), deleted, "Cache delete");
        Ok(deleted)
    }

    /// Remove every key matching the glob `pattern` for `tenant_id`.
    ///
    /// The pattern is namespaced exactly like a key, so a tenant can only
    /// clear its own entries.
    pub async fn clear_by_pattern(&self, pattern: &str, tenant_id: Option<&str>) -> CacheResult<u64> {
        self.ensure_initialized().await?;

        let physical = self.generate_key(pattern, tenant_id);
        match self.backend.clear_by_pattern(&physical).await {
            Ok(cleared) => {
                self.forget_access_matching(&physical);
                debug!(pattern = %physical, cleared, "Cache pattern clear");
                Ok(cleared)
            }
            Err(e) => {
                self.metrics.record_error("clear", &physical, None);
                Err(e)
            }
        }
    }
}
