// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::connector::ResilienceStats;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Required backend settings are missing or invalid.
    #[error("Cache configuration error: {0}")]
    Configuration(String),
    /// Transient network failure, reported with the number of attempts made.
    #[error("Connection '{label}' failed after {attempts} attempt(s): {message}")]
    Connection {
        label: String,
        attempts: usize,
        message: String,
    },
    /// Operation invoked before the backend finished initializing.
    #[error("Cache backend '{0}' is not initialized")]
    NotReady(String),
    #[error("Cache serialization error: {0}")]
    Serialization(String),
    #[error("Invalid cache pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
    #[error("Cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    /// Whether retrying the same operation could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Short label used for metrics and log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Connection { .. } => "connection",
            Self::NotReady(_) => "not_ready",
            Self::Serialization(_) => "serialization",
            Self::Pattern { .. } => "pattern",
            Self::Backend(_) => "backend",
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Raw key/value store behind the cache service.
///
/// Keys handed to a backend are already namespaced; values are already
/// serialized. Patterns use the glob dialect described in
/// [`GlobPattern`](super::pattern::GlobPattern).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Prepare the backend for use. Calling it again once ready is a no-op.
    async fn initialize(&self) -> CacheResult<()>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Delete the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// Delete every key matching a glob pattern, returning how many were removed.
    async fn clear_by_pattern(&self, pattern: &str) -> CacheResult<u64>;

    /// Drop every entry this backend owns.
    ///
    /// Default implementation clears by the match-all pattern.
    async fn flush_all(&self) -> CacheResult<()> {
        self.clear_by_pattern("*").await.map(|_| ())
    }

    async fn disconnect(&self) -> CacheResult<()>;

    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Connection retry statistics, for backends that dial out.
    fn connector_stats(&self) -> Option<ResilienceStats> {
        None
    }
}
