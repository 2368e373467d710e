// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process backend.
//!
//! Entries live in a [`DashMap`] with an absolute expiry. Expired entries are
//! removed two ways: lazily when `get` trips over one, and by a background
//! sweeper that wakes every `sweep_interval` once the store is initialized.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::pattern::GlobPattern;
use super::traits::{CacheBackend, CacheResult};

/// Default sweeper period.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct LocalEntry {
    value: String,
    expires_at: Instant,
}

impl LocalEntry {
    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct LocalStore {
    data: Arc<DashMap<String, LocalEntry>>,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl LocalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }

    #[must_use]
    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            sweep_interval,
            sweeper: Mutex::new(None),
        }
    }

    /// Current entry count, including entries that expired but were not swept yet.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the background sweeper is running.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Remove every expired entry now. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        sweep(&self.data)
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LocalStore {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

fn sweep(data: &DashMap<String, LocalEntry>) -> usize {
    let now = Instant::now();
    let before = data.len();
    data.retain(|_, entry| !entry.is_expired(now));
    before.saturating_sub(data.len())
}

#[async_trait]
impl CacheBackend for LocalStore {
    async fn initialize(&self) -> CacheResult<()> {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return Ok(());
        }

        let data = Arc::clone(&self.data);
        let period = self.sweep_interval;
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = sweep(&data);
                if removed > 0 {
                    debug!(removed, remaining = data.len(), "Swept expired local entries");
                }
            }
        }));

        info!(sweep_interval = ?self.sweep_interval, "Local cache store initialized");
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let now = Instant::now();
        match self.data.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }

        // Read guard is released; re-check so a concurrent fresh `set` survives.
        if self.data.remove_if(key, |_, entry| entry.is_expired(now)).is_some() {
            debug!(key, "Evicted stale local entry on read");
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.data.insert(
            key.to_string(),
            LocalEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        let removed = keys
            .iter()
            .filter(|key| self.data.remove(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn clear_by_pattern(&self, pattern: &str) -> CacheResult<u64> {
        let glob = GlobPattern::compile(pattern)?;
        if glob.is_match_all() {
            let removed = self.data.len();
            self.data.clear();
            return Ok(removed as u64);
        }

        let before = self.data.len();
        self.data.retain(|key, _| !glob.matches(key));
        let removed = before.saturating_sub(self.data.len());
        debug!(pattern, removed, "Local pattern clear");
        Ok(removed as u64)
    }

    /// Disconnect and re-initialize: the map is emptied and the sweeper restarted.
    async fn flush_all(&self) -> CacheResult<()> {
        self.disconnect().await?;
        self.initialize().await
    }

    async fn disconnect(&self) -> CacheResult<()> {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.data.clear();
        info!("Local cache store disconnected");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = LocalStore::new();
        assert!(store.is_empty());
        assert!(!store.is_initialized());
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let store = LocalStore::new();
        store.set("k", "\"v\"", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("\"v\""));
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = LocalStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted_on_read() {
        let store = LocalStore::new();
        store.set("short", "1", Duration::from_millis(20)).await.unwrap();
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get("short").await.unwrap().is_none());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_sweep_expired_removes_only_stale() {
        let store = LocalStore::new();
        store.set("stale", "1", Duration::from_millis(10)).await.unwrap();
        store.set("fresh", "2", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_background_sweeper_runs() {
        let store = LocalStore::with_sweep_interval(Duration::from_millis(20));
        store.initialize().await.unwrap();
        store.set("stale", "1", Duration::from_millis(5)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        // Removed without any read touching it
        assert_eq!(store.len(), 0);
        store.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = LocalStore::new();
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();
        assert!(store.is_initialized());
        store.disconnect().await.unwrap();
        assert!(!store.is_initialized());
    }

    #[tokio::test]
    async fn test_delete_counts_existing_keys() {
        let store = LocalStore::new();
        store.set("a", "1", Duration::from_secs(60)).await.unwrap();
        store.set("b", "2", Duration::from_secs(60)).await.unwrap();

        let removed = store.delete(&keys(&["a", "b", "missing"])).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_clear_by_pattern() {
        let store = LocalStore::new();
        for key in ["collection:posts:list", "collection:posts:1", "collection:users:list"] {
            store.set(key, "x", Duration::from_secs(60)).await.unwrap();
        }

        let removed = store.clear_by_pattern("collection:posts:*").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("collection:users:list").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_by_empty_pattern_is_error() {
        let store = LocalStore::new();
        assert!(store.clear_by_pattern("").await.is_err());
    }

    #[tokio::test]
    async fn test_flush_all_empties_and_restarts() {
        let store = LocalStore::new();
        store.initialize().await.unwrap();
        store.set("a", "1", Duration::from_secs(60)).await.unwrap();

        store.flush_all().await.unwrap();

        assert!(store.is_empty());
        assert!(store.is_initialized());
        store.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let store = Arc::new(LocalStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let key = format!("batch-{}-item-{}", batch, i);
                    store.set(&key, "v", Duration::from_secs(60)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
