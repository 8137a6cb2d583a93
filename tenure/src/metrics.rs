//! Metrics declaration and recording.
//!
//! With the `metrics` feature disabled every recording function is an empty
//! inline no-op.

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

use crate::label::HandlerLabel;
use crate::tier::CostTier;

#[cfg(feature = "metrics")]
lazy_static! {
    // Governor readings

    /// Tenured generation usage at the last zone check.
    pub static ref TENURED_USED_GAUGE: &'static str = {
        metrics::describe_gauge!(
            "tenure_memory_tenured_used_bytes",
            metrics::Unit::Bytes,
            "Tenured generation bytes in use at the last zone check."
        );
        "tenure_memory_tenured_used_bytes"
    };
    /// Tenured generation size at the last zone check.
    pub static ref TENURED_TOTAL_GAUGE: &'static str = {
        metrics::describe_gauge!(
            "tenure_memory_tenured_total_bytes",
            metrics::Unit::Bytes,
            "Tenured generation size at the last zone check."
        );
        "tenure_memory_tenured_total_bytes"
    };
    /// Published tenured usage threshold.
    pub static ref THRESHOLD_GAUGE: &'static str = {
        metrics::describe_gauge!(
            "tenure_memory_threshold_bytes",
            metrics::Unit::Bytes,
            "Tenured usage threshold published to instrumentation."
        );
        "tenure_memory_threshold_bytes"
    };
    /// Track number of collection requests.
    pub static ref GC_REQUESTS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "tenure_memory_gc_requests_total",
            "Total number of collection requests forwarded to instrumentation."
        );
        "tenure_memory_gc_requests_total"
    };

    // Reclamation

    /// Track memory handler invocations per handler and tier.
    pub static ref HANDLER_INVOCATIONS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "tenure_memory_handler_invocations_total",
            "Total number of memory handler invocations."
        );
        "tenure_memory_handler_invocations_total"
    };
    /// Track entries evicted from cache tables.
    pub static ref CACHE_EVICTIONS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "tenure_cache_evictions_total",
            "Total number of cache table entries evicted."
        );
        "tenure_cache_evictions_total"
    };
    /// Track secondary caches dropped by registries.
    pub static ref SECONDARY_CLEARED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "tenure_secondary_caches_cleared_total",
            "Total number of secondary caches dropped from registries."
        );
        "tenure_secondary_caches_cleared_total"
    };
}

/// Record the readings taken by a zone check.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_memory_readings(tenured_used: u64, tenured_total: u64, threshold: u64) {
    metrics::gauge!(*TENURED_USED_GAUGE).set(tenured_used as f64);
    metrics::gauge!(*TENURED_TOTAL_GAUGE).set(tenured_total as f64);
    metrics::gauge!(*THRESHOLD_GAUGE).set(threshold as f64);
}

/// Record a forwarded collection request.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_gc_request() {
    metrics::counter!(*GC_REQUESTS_COUNTER).increment(1);
}

/// Record one handler invocation.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_handler_invocation(handler: &HandlerLabel, tier: CostTier) {
    metrics::counter!(
        *HANDLER_INVOCATIONS_COUNTER,
        "handler" => handler.to_string(),
        "tier" => tier.as_str()
    )
    .increment(1);
}

/// Record entries evicted from a cache table.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_cache_evictions(cache: &HandlerLabel, count: usize) {
    if count > 0 {
        metrics::counter!(*CACHE_EVICTIONS_COUNTER, "cache" => cache.to_string())
            .increment(count as u64);
    }
}

/// Record secondary caches dropped by a registry.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_secondary_cleared(registry: &HandlerLabel, count: usize) {
    if count > 0 {
        metrics::counter!(*SECONDARY_CLEARED_COUNTER, "registry" => registry.to_string())
            .increment(count as u64);
    }
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_memory_readings(_tenured_used: u64, _tenured_total: u64, _threshold: u64) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_gc_request() {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_handler_invocation(_handler: &HandlerLabel, _tier: CostTier) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_cache_evictions(_cache: &HandlerLabel, _count: usize) {}

#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_secondary_cleared(_registry: &HandlerLabel, _count: usize) {}
