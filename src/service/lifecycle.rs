// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Service lifecycle: lazy initialization, invalidate-all, disconnect.

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{error, info};

use crate::storage::traits::CacheResult;

use super::{CacheService, ServiceState};

/// One initialization attempt, awaited by every caller that arrives while it runs.
pub(crate) type InitFlight = Shared<BoxFuture<'static, CacheResult<()>>>;

impl CacheService {
    /// Initialize the backend once.
    ///
    /// The first caller starts `backend.initialize()` and publishes it as the
    /// current flight; concurrent callers await that same flight and share its
    /// outcome, success or failure. The flight slot is emptied when the attempt
    /// finishes, so only a call arriving afterwards starts a new attempt. A
    /// failed attempt returns the service to `Uninitialized`.
    pub async fn ensure_initialized(&self) -> CacheResult<()> {
        if self.state() == ServiceState::Ready {
            return Ok(());
        }

        let flight = {
            let mut slot = self.init_flight.lock();
            match slot.as_ref() {
                Some(flight) => flight.clone(),
                None => {
                    if self.state() == ServiceState::Ready {
                        return Ok(());
                    }
                    let flight = self.start_init_flight();
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    fn start_init_flight(&self) -> InitFlight {
        let _ = self.state.send(ServiceState::Initializing);

        let backend = self.backend.clone();
        let state = self.state.clone();
        let slot = self.init_flight.clone();
        async move {
            let result = backend.initialize().await;
            match &result {
                Ok(()) => {
                    let _ = state.send(ServiceState::Ready);
                    info!(backend = backend.name(), "Cache service ready");
                }
                Err(e) => {
                    let _ = state.send(ServiceState::Uninitialized);
                    error!(backend = backend.name(), error = %e, "Cache backend failed to initialize");
                }
            }
            *slot.lock() = None;
            result
        }
        .boxed()
        .shared()
    }

    /// Drop every cached entry and the access log.
    ///
    /// The local store is torn down and re-initialized; the remote store
    /// clears its keyspace by the match-all pattern.
    #[tracing::instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn invalidate_all(&self) -> CacheResult<()> {
        self.ensure_initialized().await?;

        if let Err(e) = self.backend.flush_all().await {
            self.metrics.record_error("invalidate_all", "*", None);
            return Err(e);
        }
        self.access_log.clear();
        info!("Invalidated entire cache");
        Ok(())
    }

    /// Release the backend. A later operation initializes it again.
    #[tracing::instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn disconnect(&self) -> CacheResult<()> {
        // Let a running initialization settle before tearing the backend down
        let pending = self.init_flight.lock().clone();
        if let Some(flight) = pending {
            let _ = flight.await;
        }
        self.backend.disconnect().await?;
        let _ = self.state.send(ServiceState::Uninitialized);
        info!("Cache service disconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::storage::traits::{CacheBackend, CacheError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Backend that counts initialize calls and can be told to fail them.
    #[derive(Default)]
    struct CountingBackend {
        inits: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl CacheBackend for CountingBackend {
        async fn initialize(&self) -> CacheResult<()> {
            let n = self.inits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if n < self.fail_first {
                return Err(CacheError::Connection {
                    label: "test".into(),
                    attempts: 1,
                    message: "down".into(),
                });
            }
            Ok(())
        }
        async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
            Ok(())
        }
        async fn delete(&self, _keys: &[String]) -> CacheResult<u64> {
            Ok(0)
        }
        async fn clear_by_pattern(&self, _pattern: &str) -> CacheResult<u64> {
            Ok(0)
        }
        async fn disconnect(&self) -> CacheResult<()> {
            Ok(())
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn service(backend: Arc<CountingBackend>) -> CacheService {
        let settings: Arc<HashMap<String, String>> = Arc::new(HashMap::new());
        CacheService::with_backend(CacheConfig::default(), settings, backend)
    }

    #[tokio::test]
    async fn test_concurrent_callers_initialize_once() {
        let backend = Arc::new(CountingBackend::default());
        let cache = Arc::new(service(Arc::clone(&backend)));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.ensure_initialized().await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(), ServiceState::Ready);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failed_attempt() {
        let backend = Arc::new(CountingBackend {
            fail_first: usize::MAX,
            ..Default::default()
        });
        let cache = Arc::new(service(Arc::clone(&backend)));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.ensure_initialized().await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_err());
        }

        assert_eq!(backend.inits.load(Ordering::SeqCst), 1);
        assert_eq!(cache.state(), ServiceState::Uninitialized);

        // A call after the attempt finished starts a fresh one
        assert!(cache.ensure_initialized().await.is_err());
        assert_eq!(backend.inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_initialize_can_be_retried() {
        let backend = Arc::new(CountingBackend {
            fail_first: 1,
            ..Default::default()
        });
        let cache = service(Arc::clone(&backend));

        assert!(cache.ensure_initialized().await.is_err());
        assert_eq!(cache.state(), ServiceState::Uninitialized);

        cache.ensure_initialized().await.unwrap();
        assert_eq!(backend.inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disconnect_returns_to_uninitialized() {
        let backend = Arc::new(CountingBackend::default());
        let cache = service(Arc::clone(&backend));

        cache.ensure_initialized().await.unwrap();
        cache.disconnect().await.unwrap();
        assert_eq!(cache.state(), ServiceState::Uninitialized);

        let mut rx = cache.state_receiver();
        let _: Option<String> = cache.get("k", None, None).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(backend.inits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_all_on_local_store() {
        let settings: Arc<HashMap<String, String>> = Arc::new(HashMap::new());
        let cache = CacheService::new(CacheConfig::default(), settings).unwrap();

        cache.set("a", "1", 60, None, None).await.unwrap();
        let _: Option<String> = cache.get("a", None, None).await.unwrap();
        cache.invalidate_all().await.unwrap();

        let after: Option<String> = cache.get("a", None, None).await.unwrap();
        assert!(after.is_none());
        assert_eq!(cache.state(), ServiceState::Ready);
        // Only the post-invalidate read remains in the access log
        assert_eq!(cache.get_access_analytics(None)[0].count, 1);
    }
}
