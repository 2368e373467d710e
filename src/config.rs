// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the cache service.
//!
//! # Example
//!
//! ```
//! use tenant_cache::CacheConfig;
//!
//! // Minimal config (uses defaults): in-process backend, single tenant
//! let config = CacheConfig::default();
//! assert!(!config.use_redis);
//! assert_eq!(config.default_ttl_secs, 300);
//!
//! // Redis with multi-tenant isolation
//! let config = CacheConfig {
//!     use_redis: true,
//!     redis_url: Some("redis://localhost:6379".into()),
//!     multi_tenant: true,
//!     ..Default::default()
//! };
//! assert_eq!(config.retry_config().max_attempts, Some(5));
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::resilience::retry::RetryConfig;

/// Narrow read-only view of the host application's settings.
///
/// The cache never loads configuration itself; it asks the host for
/// individual keys such as `REDIS_URL` or `CACHE_TTL_CONTENT`.
pub trait SettingsProvider: Send + Sync {
    fn setting(&self, key: &str) -> Option<String>;
}

/// Reads settings from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl SettingsProvider for EnvSettings {
    fn setting(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl SettingsProvider for HashMap<String, String> {
    fn setting(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Configuration for the cache service.
///
/// All fields have sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Use Redis instead of the in-process store
    #[serde(default)]
    pub use_redis: bool,

    /// Redis connection string (e.g., "redis://:password@localhost:6379/0")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Connection attempts before giving up on startup
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: f64,
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    /// Prefix keys with `tenant:{id}:`
    #[serde(default)]
    pub multi_tenant: bool,

    /// Local store expiry sweep period
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// TTL for unknown categories and zero-TTL writes without a category
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Run registered prefetch patterns on reads
    #[serde(default = "default_prefetch_enabled")]
    pub prefetch_enabled: bool,
}

fn default_retry_attempts() -> usize { 5 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_retry_max_delay_ms() -> u64 { 30_000 }
fn default_retry_backoff_multiplier() -> f64 { 2.0 }
fn default_retry_jitter_ms() -> u64 { 100 }
fn default_sweep_interval_secs() -> u64 { 60 }
fn default_ttl_secs() -> u64 { 300 }
fn default_prefetch_enabled() -> bool { true }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            use_redis: false,
            redis_url: None,
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_backoff_multiplier: default_retry_backoff_multiplier(),
            retry_jitter_ms: default_retry_jitter_ms(),
            multi_tenant: false,
            sweep_interval_secs: default_sweep_interval_secs(),
            default_ttl_secs: default_ttl_secs(),
            prefetch_enabled: default_prefetch_enabled(),
        }
    }
}

impl CacheConfig {
    /// Build a config from individual host settings, keeping defaults for
    /// anything missing or unparsable.
    pub fn from_settings(settings: &dyn SettingsProvider) -> Self {
        let mut config = Self::default();

        config.use_redis = parse_setting(settings, "CACHE_USE_REDIS", config.use_redis);
        config.redis_url = settings
            .setting("REDIS_URL")
            .filter(|url| !url.trim().is_empty());
        config.retry_attempts = parse_setting(settings, "REDIS_RETRY_ATTEMPTS", config.retry_attempts);
        config.retry_delay_ms = parse_setting(settings, "REDIS_RETRY_DELAY", config.retry_delay_ms);
        config.retry_max_delay_ms =
            parse_setting(settings, "REDIS_RETRY_MAX_DELAY", config.retry_max_delay_ms);
        config.multi_tenant = parse_setting(settings, "MULTI_TENANT_ENABLED", config.multi_tenant);
        config.default_ttl_secs = parse_setting(settings, "CACHE_DEFAULT_TTL", config.default_ttl_secs);
        config.prefetch_enabled =
            parse_setting(settings, "CACHE_PREFETCH_ENABLED", config.prefetch_enabled);

        config
    }

    /// Retry policy used to establish the remote connection.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: Some(self.retry_attempts.max(1)),
            initial_delay: Duration::from_millis(self.retry_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms.max(self.retry_delay_ms)),
            factor: self.retry_backoff_multiplier,
            jitter: Duration::from_millis(self.retry_jitter_ms),
        }
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn parse_setting<T: FromStr>(settings: &dyn SettingsProvider, key: &str, fallback: T) -> T {
    match settings.setting(key) {
        None => fallback,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "Ignoring unparsable setting");
                fallback
            }
        },
    }
}
