// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage backends for the cache.
//!
//! - [`memory::LocalStore`]: in-process map with per-entry expiry
//! - [`redis::RemoteStore`]: shared Redis instance with server-side expiry
//!
//! Both implement [`traits::CacheBackend`]; the service only ever talks to
//! the trait object returned by [`create_backend`].

pub mod memory;
pub mod pattern;
pub mod redis;
pub mod traits;

use std::sync::Arc;
use tracing::info;

use crate::config::CacheConfig;
use self::memory::LocalStore;
use self::redis::RemoteStore;
use self::traits::{CacheBackend, CacheResult};

/// Select and build the backend described by `config`.
///
/// Fails with [`CacheError::Configuration`](traits::CacheError::Configuration)
/// when Redis is selected without a usable URL. Nothing is connected yet;
/// call [`CacheBackend::initialize`] before use.
pub fn create_backend(config: &CacheConfig) -> CacheResult<Arc<dyn CacheBackend>> {
    if config.use_redis {
        let store = RemoteStore::new(config.redis_url.as_deref(), config.retry_config())?;
        info!(backend = "redis", "Cache backend selected");
        Ok(store)
    } else {
        info!(backend = "local", "Cache backend selected");
        Ok(Arc::new(LocalStore::with_sweep_interval(config.sweep_interval())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::traits::CacheError;

    #[test]
    fn test_local_backend_by_default() {
        let backend = create_backend(&CacheConfig::default()).unwrap();
        assert_eq!(backend.name(), "local");
        assert!(backend.connector_stats().is_none());
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let config = CacheConfig {
            use_redis: true,
            ..Default::default()
        };
        let err = create_backend(&config).err().unwrap();
        assert!(matches!(err, CacheError::Configuration(_)));
    }

    #[test]
    fn test_redis_backend_selected() {
        let config = CacheConfig {
            use_redis: true,
            redis_url: Some("redis://127.0.0.1:6379".into()),
            ..Default::default()
        };
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.name(), "redis");
        assert_eq!(backend.connector_stats().unwrap().total_retries, 0);
    }
}
