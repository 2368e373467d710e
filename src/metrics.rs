// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the cache.
//!
//! Two layers:
//!
//! - [`CacheMetrics`] is an in-process recorder that keeps hit/miss/TTL
//!   statistics (global, per category, per tenant) plus a bounded log of
//!   recent events, and renders them as Prometheus text.
//! - Every record call is mirrored to the `metrics` crate facade, so a host
//!   that installed its own exporter (Prometheus, OTEL, etc.) sees the same
//!   data without scraping the text export.
//!
//! Recording never fails and never affects cache correctness.
//!
//! # Metric Naming Convention
//! - `tenant_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `category`: schema, content, ... or a custom category name
//! - `operation`: get, set, delete, clear, prefetch, warm

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write;
use std::time::{Duration, Instant};

/// Recent-event log capacity.
pub const RECENT_EVENTS_CAPACITY: usize = 100;

/// Label used when a call carries no category.
const UNCATEGORIZED: &str = "uncategorized";

/// Label used when a call carries no tenant.
const DEFAULT_TENANT: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEventKind {
    Hit,
    Miss,
    Set,
    Delete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    pub key: String,
    pub category: String,
    pub tenant_id: Option<String>,
    pub response_time_ms: Option<f64>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    response_time_sum_ms: f64,
    timed_requests: u64,
}

impl Counters {
    fn record(&mut self, hit: bool, response_time_ms: Option<f64>) {
        if hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        if let Some(ms) = response_time_ms {
            self.response_time_sum_ms += ms;
            self.timed_requests += 1;
        }
    }

    fn total(&self) -> u64 {
        self.hits + self.misses
    }

    fn hit_rate(&self) -> f64 {
        ratio(self.hits as f64, self.total())
    }

    fn avg_response_time_ms(&self) -> f64 {
        ratio(self.response_time_sum_ms, self.timed_requests)
    }
}

#[derive(Debug, Clone, Default)]
struct CategoryCounters {
    requests: Counters,
    sets: u64,
    ttl_sum_secs: u64,
    errors: u64,
}

#[derive(Debug, Default)]
struct MetricsState {
    global: Counters,
    sets: u64,
    deletes: u64,
    errors: u64,
    categories: HashMap<String, CategoryCounters>,
    tenants: HashMap<String, Counters>,
    recent: VecDeque<CacheEvent>,
}

impl MetricsState {
    fn push_event(&mut self, event: CacheEvent) {
        if self.recent.len() >= RECENT_EVENTS_CAPACITY {
            self.recent.pop_front();
        }
        self.recent.push_back(event);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub sets: u64,
    pub avg_ttl_secs: f64,
    pub errors: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TenantSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub avg_response_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
    pub avg_response_time_ms: f64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub categories: BTreeMap<String, CategorySnapshot>,
    /// Only present when requested.
    pub tenants: Option<BTreeMap<String, TenantSnapshot>>,
    pub uptime_secs: f64,
}

/// Passive recorder of cache statistics.
///
/// All counters sit behind one lock so `hits + misses == total_requests`
/// holds in every snapshot, even under concurrent writers.
#[derive(Debug)]
pub struct CacheMetrics {
    state: Mutex<MetricsState>,
    started: Mutex<Instant>,
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MetricsState::default()),
            started: Mutex::new(Instant::now()),
        }
    }

    pub fn record_hit(&self, key: &str, category: Option<&str>, tenant_id: Option<&str>, response_time_ms: Option<f64>) {
        self.record_lookup(true, key, category, tenant_id, response_time_ms);
    }

    pub fn record_miss(&self, key: &str, category: Option<&str>, tenant_id: Option<&str>, response_time_ms: Option<f64>) {
        self.record_lookup(false, key, category, tenant_id, response_time_ms);
    }

    fn record_lookup(
        &self,
        hit: bool,
        key: &str,
        category: Option<&str>,
        tenant_id: Option<&str>,
        response_time_ms: Option<f64>,
    ) {
        let category_label = category.unwrap_or(UNCATEGORIZED);
        let hit_rate = {
            let mut state = self.state.lock();
            state.global.record(hit, response_time_ms);
            state
                .categories
                .entry(category_label.to_string())
                .or_default()
                .requests
                .record(hit, response_time_ms);
            state
                .tenants
                .entry(tenant_id.unwrap_or(DEFAULT_TENANT).to_string())
                .or_default()
                .record(hit, response_time_ms);
            state.push_event(CacheEvent {
                kind: if hit { CacheEventKind::Hit } else { CacheEventKind::Miss },
                key: key.to_string(),
                category: category_label.to_string(),
                tenant_id: tenant_id.map(str::to_string),
                response_time_ms,
                at: Utc::now(),
            });
            state.global.hit_rate()
        };

        let outcome = if hit { "hit" } else { "miss" };
        counter!(
            "tenant_cache_requests_total",
            "category" => category_label.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        gauge!("tenant_cache_hit_rate").set(hit_rate);
        if let Some(ms) = response_time_ms {
            histogram!(
                "tenant_cache_response_seconds",
                "category" => category_label.to_string()
            )
            .record(ms / 1000.0);
        }
    }

    /// Record a write and fold its TTL into the category average.
    pub fn record_set(&self, key: &str, category: Option<&str>, tenant_id: Option<&str>, ttl_secs: u64) {
        let category_label = category.unwrap_or(UNCATEGORIZED);
        {
            let mut state = self.state.lock();
            state.sets += 1;
            let entry = state.categories.entry(category_label.to_string()).or_default();
            entry.sets += 1;
            entry.ttl_sum_secs += ttl_secs;
            state.push_event(CacheEvent {
                kind: CacheEventKind::Set,
                key: key.to_string(),
                category: category_label.to_string(),
                tenant_id: tenant_id.map(str::to_string),
                response_time_ms: None,
                at: Utc::now(),
            });
        }

        counter!("tenant_cache_sets_total", "category" => category_label.to_string()).increment(1);
        histogram!("tenant_cache_ttl_seconds", "category" => category_label.to_string())
            .record(ttl_secs as f64);
    }

    pub fn record_delete(&self, key: &str, tenant_id: Option<&str>) {
        {
            let mut state = self.state.lock();
            state.deletes += 1;
            state.push_event(CacheEvent {
                kind: CacheEventKind::Delete,
                key: key.to_string(),
                category: UNCATEGORIZED.to_string(),
                tenant_id: tenant_id.map(str::to_string),
                response_time_ms: None,
                at: Utc::now(),
            });
        }
        counter!("tenant_cache_deletes_total").increment(1);
    }

    /// Record a cache-layer failure for `operation` (get, set, clear, prefetch, ...).
    pub fn record_error(&self, operation: &str, key: &str, category: Option<&str>) {
        let category_label = category.unwrap_or(UNCATEGORIZED);
        {
            let mut state = self.state.lock();
            state.errors += 1;
            state.categories.entry(category_label.to_string()).or_default().errors += 1;
            state.push_event(CacheEvent {
                kind: CacheEventKind::Error,
                key: key.to_string(),
                category: category_label.to_string(),
                tenant_id: None,
                response_time_ms: None,
                at: Utc::now(),
            });
        }
        counter!(
            "tenant_cache_errors_total",
            "operation" => operation.to_string(),
            "category" => category_label.to_string()
        )
        .increment(1);
    }

    /// Most recent events, oldest first, at most `limit` of them.
    #[must_use]
    pub fn get_recent_events(&self, limit: usize) -> Vec<CacheEvent> {
        let state = self.state.lock();
        let skip = state.recent.len().saturating_sub(limit);
        state.recent.iter().skip(skip).cloned().collect()
    }

    #[must_use]
    pub fn get_snapshot(&self, include_tenants: bool) -> MetricsSnapshot {
        let uptime = self.started.lock().elapsed();
        let state = self.state.lock();

        let categories = state
            .categories
            .iter()
            .map(|(name, c)| {
                (
                    name.clone(),
                    CategorySnapshot {
                        hits: c.requests.hits,
                        misses: c.requests.misses,
                        hit_rate: c.requests.hit_rate(),
                        sets: c.sets,
                        avg_ttl_secs: ratio(c.ttl_sum_secs as f64, c.sets),
                        errors: c.errors,
                    },
                )
            })
            .collect();

        let tenants = include_tenants.then(|| {
            state
                .tenants
                .iter()
                .map(|(tenant, c)| {
                    (
                        tenant.clone(),
                        TenantSnapshot {
                            hits: c.hits,
                            misses: c.misses,
                            hit_rate: c.hit_rate(),
                            avg_response_time_ms: c.avg_response_time_ms(),
                        },
                    )
                })
                .collect()
        });

        MetricsSnapshot {
            hits: state.global.hits,
            misses: state.global.misses,
            total_requests: state.global.total(),
            hit_rate: state.global.hit_rate(),
            avg_response_time_ms: state.global.avg_response_time_ms(),
            sets: state.sets,
            deletes: state.deletes,
            errors: state.errors,
            categories,
            tenants,
            uptime_secs: uptime.as_secs_f64(),
        }
    }

    /// Render the current statistics in Prometheus text exposition format.
    #[must_use]
    pub fn export_prometheus_format(&self) -> String {
        let snapshot = self.get_snapshot(true);
        let mut output = String::new();
        let prefix = "tenant_cache";

        write_metric(&mut output, prefix, "hits_total", "counter", "Total cache hits", snapshot.hits as f64);
        write_metric(&mut output, prefix, "misses_total", "counter", "Total cache misses", snapshot.misses as f64);
        write_metric(&mut output, prefix, "requests_total", "counter", "Total cache lookups", snapshot.total_requests as f64);
        write_metric(&mut output, prefix, "sets_total", "counter", "Total cache writes", snapshot.sets as f64);
        write_metric(&mut output, prefix, "deletes_total", "counter", "Total cache deletes", snapshot.deletes as f64);
        write_metric(&mut output, prefix, "errors_total", "counter", "Total cache-layer errors", snapshot.errors as f64);
        write_metric(&mut output, prefix, "hit_rate", "gauge", "Cache hit rate (0.0 - 1.0)", snapshot.hit_rate);
        write_metric(
            &mut output,
            prefix,
            "avg_response_time_ms",
            "gauge",
            "Average lookup response time in milliseconds",
            snapshot.avg_response_time_ms,
        );
        write_metric(&mut output, prefix, "uptime_seconds", "gauge", "Seconds since metrics were last reset", snapshot.uptime_secs);

        if !snapshot.categories.is_empty() {
            let _ = writeln!(output, "# HELP {}_category_hit_rate Hit rate per cache category", prefix);
            let _ = writeln!(output, "# TYPE {}_category_hit_rate gauge", prefix);
            for (category, c) in &snapshot.categories {
                let _ = writeln!(
                    output,
                    "{}_category_hit_rate{{category=\"{}\"}} {}",
                    prefix,
                    escape_label(category),
                    c.hit_rate
                );
            }
            let _ = writeln!(output);

            let _ = writeln!(output, "# HELP {}_category_avg_ttl_seconds Average TTL of writes per category", prefix);
            let _ = writeln!(output, "# TYPE {}_category_avg_ttl_seconds gauge", prefix);
            for (category, c) in &snapshot.categories {
                let _ = writeln!(
                    output,
                    "{}_category_avg_ttl_seconds{{category=\"{}\"}} {}",
                    prefix,
                    escape_label(category),
                    c.avg_ttl_secs
                );
            }
            let _ = writeln!(output);
        }

        if let Some(tenants) = snapshot.tenants.as_ref().filter(|t| !t.is_empty()) {
            let _ = writeln!(output, "# HELP {}_tenant_hit_rate Hit rate per tenant", prefix);
            let _ = writeln!(output, "# TYPE {}_tenant_hit_rate gauge", prefix);
            for (tenant, t) in tenants {
                let _ = writeln!(
                    output,
                    "{}_tenant_hit_rate{{tenant=\"{}\"}} {}",
                    prefix,
                    escape_label(tenant),
                    t.hit_rate
                );
            }
            let _ = writeln!(output);
        }

        output
    }

    /// Zero every counter and drop the event log.
    pub fn reset(&self) {
        *self.state.lock() = MetricsState::default();
        *self.started.lock() = Instant::now();
    }
}

fn ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

fn write_metric(output: &mut String, prefix: &str, name: &str, kind: &str, help: &str, value: f64) {
    let _ = writeln!(output, "# HELP {}_{} {}", prefix, name, help);
    let _ = writeln!(output, "# TYPE {}_{} {}", prefix, name, kind);
    let _ = writeln!(output, "{}_{} {}\n", prefix, name, value);
}

fn escape_label(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

/// A timing guard that measures a lookup in milliseconds.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    #[must_use]
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}
