// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Access-frequency analytics and TTL recommendations.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::category::CacheCategory;
use crate::storage::pattern::GlobPattern;

use super::{CacheService, KeyAccessStats, ACCESS_LOG_CAPACITY};

/// Accesses per minute at or above which a key counts as hot.
const HOT_ACCESS_RATE: f64 = 10.0;

/// Accesses per minute at or above which a key counts as warm.
const WARM_ACCESS_RATE: f64 = 1.0;

const MAX_RECOMMENDED_TTL_SECS: u64 = 86_400;
const MIN_RECOMMENDED_TTL_SECS: u64 = 30;

impl CacheService {
    /// Append an access timestamp to the key's window, dropping the oldest
    /// once the window is full.
    pub(crate) fn record_access(&self, physical_key: &str) {
        let mut window = self.access_log.entry(physical_key.to_string()).or_default();
        if window.len() >= ACCESS_LOG_CAPACITY {
            window.pop_front();
        }
        window.push_back(Utc::now());
    }

    /// Drop the access windows of keys that were removed from the cache.
    pub(crate) fn forget_access(&self, physical_keys: &[String]) {
        for key in physical_keys {
            self.access_log.remove(key);
        }
    }

    /// Drop the access windows of every key matching a physical glob.
    pub(crate) fn forget_access_matching(&self, physical_pattern: &str) {
        match GlobPattern::compile(physical_pattern) {
            Ok(glob) => self.access_log.retain(|key, _| !glob.matches(key)),
            Err(e) => debug!(pattern = physical_pattern, error = %e, "Access log left as is"),
        }
    }

    /// Per-key access statistics, hottest first. `limit` caps the result.
    #[must_use]
    pub fn get_access_analytics(&self, limit: Option<usize>) -> Vec<KeyAccessStats> {
        let mut stats: Vec<KeyAccessStats> = self
            .access_log
            .iter()
            .filter_map(|entry| {
                let window = entry.value();
                let first = *window.front()?;
                let last = *window.back()?;
                Some(KeyAccessStats {
                    key: entry.key().clone(),
                    count: window.len(),
                    first_access: first,
                    last_access: last,
                    accesses_per_minute: access_rate(window.len(), first, last),
                })
            })
            .collect();

        stats.sort_by(|a, b| {
            b.accesses_per_minute
                .total_cmp(&a.accesses_per_minute)
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.key.cmp(&b.key))
        });
        if let Some(limit) = limit {
            stats.truncate(limit);
        }
        stats
    }

    /// Suggest a TTL in seconds for `key` from how often it is read.
    ///
    /// - 10+ reads/min: twice the category TTL, at most one day
    /// - 1+ reads/min: the category TTL
    /// - slower: half the category TTL, at least 30s
    ///
    /// Keys never read get the category TTL.
    #[must_use]
    pub fn get_recommended_ttl(
        &self,
        key: &str,
        tenant_id: Option<&str>,
        category: Option<&CacheCategory>,
    ) -> u64 {
        let base = self.ttl_policy.resolve(0, category);
        let physical = self.generate_key(key, tenant_id);

        let Some(rate) = self.access_log.get(&physical).and_then(|window| {
            let first = *window.front()?;
            let last = *window.back()?;
            Some(access_rate(window.len(), first, last))
        }) else {
            return base;
        };

        if rate >= HOT_ACCESS_RATE {
            base.saturating_mul(2).min(MAX_RECOMMENDED_TTL_SECS)
        } else if rate >= WARM_ACCESS_RATE {
            base
        } else {
            (base / 2).max(MIN_RECOMMENDED_TTL_SECS)
        }
    }
}

/// Accesses per minute over the window, treating windows shorter than a
/// minute as one minute.
fn access_rate(count: usize, first: DateTime<Utc>, last: DateTime<Utc>) -> f64 {
    let span_minutes = (last - first).num_milliseconds() as f64 / 60_000.0;
    count as f64 / span_minutes.max(1.0)
}
