//! Memory governor: the process's authority on memory health.
//!
//! A [`MemoryGovernor`] reads an injectable [`MemoryInstrumentation`],
//! derives how much of the heap counts as tenured and the usage threshold
//! that marks pressure, and drives the [`MemoryHandler`]s that caches
//! register to release memory.
//!
//! # Sizing
//!
//! | Reading | Derivation |
//! |---------|------------|
//! | total | configured `max_memory` clamped to the physical maximum |
//! | tenured total | configured bytes or percent of total, else the pool ceiling, never above total |
//! | threshold | [`CollectorDefaults::threshold`] of the tenured total |
//!
//! The tenured pool is under pressure when its usage reaches the threshold.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tenure::{MemoryGovernor, MemoryZone, SyntheticInstrumentation};
//!
//! let instrumentation = Arc::new(
//!     SyntheticInstrumentation::new(1_000_000).with_pool("G1 Old Gen", None),
//! );
//! let governor = MemoryGovernor::new(instrumentation.clone());
//!
//! assert_eq!(governor.tenured_total_memory(), 1_000_000);
//! assert_eq!(governor.calculated_tenured_threshold(), 750_000);
//!
//! instrumentation.set_heap_used(800_000);
//! instrumentation.set_tenured_used(800_000);
//! assert_eq!(governor.check_zone(), MemoryZone::Pressure);
//! ```

mod collector;
mod handler;
mod instrumentation;
mod monitor;

use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

pub use collector::{CollectorDefaults, CollectorFamily};
pub use handler::{HandlerId, MemoryHandler, Relief};
pub use instrumentation::{
    MemoryInstrumentation, PoolUsage, ProcessInstrumentation, SyntheticInstrumentation,
};
pub use monitor::MonitorHandle;

use handler::HandlerRegistry;

use crate::config::{ConfigError, MemoryConfig};
use crate::metrics;
use crate::tier::CostTier;

/// Whether the tenured pool is below its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryZone {
    /// Tenured usage below the threshold.
    Normal,
    /// Tenured usage at or above the threshold.
    Pressure,
}

/// Point-in-time memory readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemorySnapshot {
    /// When the readings were taken.
    pub taken_at: DateTime<Utc>,
    /// Managed heap ceiling.
    pub total: u64,
    /// Heap bytes in use.
    pub used: u64,
    /// Heap bytes available.
    pub free: u64,
    /// Bytes counted as tenured.
    pub tenured_total: u64,
    /// Tenured bytes in use.
    pub tenured_used: u64,
    /// Tenured bytes available.
    pub tenured_free: u64,
    /// Usage threshold that marks pressure.
    pub threshold: u64,
    /// Collector family owning the tenured pool.
    pub collector: CollectorFamily,
    /// Zone implied by these readings.
    pub zone: MemoryZone,
}

/// How the tenured total is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TenuredSizing {
    Auto,
    Bytes(u64),
    Percent(u8),
}

#[derive(Debug)]
struct Settings {
    max_memory: Option<u64>,
    tenured: TenuredSizing,
    collector: Option<CollectorDefaults>,
    monitor_interval: Duration,
}

impl Settings {
    fn total(&self, physical: u64) -> u64 {
        self.max_memory.map_or(physical, |bytes| bytes.min(physical))
    }

    fn tenured_total(&self, total: u64, pool: Option<&PoolUsage>) -> u64 {
        match self.tenured {
            TenuredSizing::Bytes(bytes) => bytes.min(total),
            TenuredSizing::Percent(pct) => total / 100 * u64::from(pct),
            TenuredSizing::Auto => pool
                .and_then(|pool| pool.max)
                .map_or(total, |max| max.min(total)),
        }
    }

    fn defaults(&self, pool: Option<&PoolUsage>) -> CollectorDefaults {
        self.collector
            .unwrap_or_else(|| family_of(pool).defaults())
    }
}

fn family_of(pool: Option<&PoolUsage>) -> CollectorFamily {
    pool.map_or(CollectorFamily::Process, |pool| {
        CollectorFamily::from_pool_name(&pool.name)
    })
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_memory: None,
            tenured: TenuredSizing::Auto,
            collector: None,
            monitor_interval: MemoryConfig::DEFAULT_MONITOR_INTERVAL,
        }
    }
}

struct GovernorInner {
    instrumentation: Arc<dyn MemoryInstrumentation>,
    settings: Mutex<Settings>,
    total: AtomicU64,
    tenured_total: AtomicU64,
    threshold: AtomicU64,
    handlers: Mutex<HandlerRegistry>,
    gc_count: AtomicU64,
}

/// Memory-health authority shared by every cache in the process.
///
/// Cloning is cheap; clones share configuration, handlers and counters.
/// Setters clamp out-of-range values instead of failing and re-run
/// [`check_zone`](Self::check_zone).
#[derive(Clone)]
pub struct MemoryGovernor {
    inner: Arc<GovernorInner>,
}

impl MemoryGovernor {
    /// Creates a governor with automatic sizing over `instrumentation`.
    pub fn new(instrumentation: Arc<dyn MemoryInstrumentation>) -> Self {
        let governor = Self {
            inner: Arc::new(GovernorInner {
                instrumentation,
                settings: Mutex::new(Settings::default()),
                total: AtomicU64::new(0),
                tenured_total: AtomicU64::new(0),
                threshold: AtomicU64::new(0),
                handlers: Mutex::new(HandlerRegistry::default()),
                gc_count: AtomicU64::new(0),
            }),
        };
        governor.check_zone();
        governor
    }

    /// Creates a governor reading the current process.
    pub fn for_process() -> Self {
        Self::new(Arc::new(ProcessInstrumentation::new()))
    }

    /// Creates a governor and applies `config` through the clamping setters.
    pub fn with_config(
        instrumentation: Arc<dyn MemoryInstrumentation>,
        config: &MemoryConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let governor = Self::new(instrumentation);
        {
            let mut settings = governor.inner.settings.lock();
            settings.max_memory = config.max_memory.filter(|&bytes| bytes > 0);
            settings.tenured = match (config.tenured_size, config.tenured_percent) {
                (Some(bytes), _) if bytes > 0 => TenuredSizing::Bytes(bytes),
                (_, Some(pct)) if pct.get() > 0 => TenuredSizing::Percent(pct.get()),
                _ => TenuredSizing::Auto,
            };
            settings.collector = config.collector;
            settings.monitor_interval = config.monitor_interval;
        }
        governor.check_zone();
        Ok(governor)
    }

    /// The instrumentation this governor reads.
    pub fn instrumentation(&self) -> &Arc<dyn MemoryInstrumentation> {
        &self.inner.instrumentation
    }

    // Configuration

    /// Caps the managed heap at `bytes`, clamped to the physical maximum.
    /// Zero restores the physical maximum. Returns the applied ceiling.
    pub fn set_max_memory(&self, bytes: u64) -> u64 {
        self.inner.settings.lock().max_memory = (bytes > 0).then_some(bytes);
        self.check_zone();
        self.total_memory()
    }

    /// Sets an absolute tenured size. `None` or zero derives it
    /// automatically. Returns the resulting tenured total.
    pub fn set_tenured_size(&self, bytes: Option<u64>) -> u64 {
        self.inner.settings.lock().tenured = match bytes {
            Some(bytes) if bytes > 0 => TenuredSizing::Bytes(bytes),
            _ => TenuredSizing::Auto,
        };
        self.check_zone();
        self.tenured_total_memory()
    }

    /// Sets the tenured size as a percentage of total memory, clamped to
    /// 100. `None` or zero derives it automatically. Returns the resulting
    /// tenured total.
    pub fn set_tenured_percent(&self, percent: Option<u8>) -> u64 {
        self.inner.settings.lock().tenured = match percent {
            Some(pct) if pct > 0 => TenuredSizing::Percent(pct.min(100)),
            _ => TenuredSizing::Auto,
        };
        self.check_zone();
        self.tenured_total_memory()
    }

    /// Replaces the detected collector's constants; `None` restores them.
    pub fn set_collector_defaults(&self, defaults: Option<CollectorDefaults>) -> u64 {
        self.inner.settings.lock().collector = defaults;
        self.check_zone();
        self.threshold()
    }

    /// Period of the background monitor.
    pub fn monitor_interval(&self) -> Duration {
        self.inner.settings.lock().monitor_interval
    }

    /// Sets the background monitor period for monitors spawned afterwards.
    /// Zero is raised to one millisecond.
    pub fn set_monitor_interval(&self, interval: Duration) -> Duration {
        let interval = interval.max(Duration::from_millis(1));
        self.inner.settings.lock().monitor_interval = interval;
        interval
    }

    // Readings

    /// Collector family detected from the tenured pool name.
    pub fn collector_family(&self) -> CollectorFamily {
        family_of(self.inner.instrumentation.tenured_pool().as_ref())
    }

    /// Constants in effect: the configured override or the family defaults.
    pub fn collector_defaults(&self) -> CollectorDefaults {
        let pool = self.inner.instrumentation.tenured_pool();
        self.inner.settings.lock().defaults(pool.as_ref())
    }

    /// Managed heap ceiling in bytes, as of the last
    /// [`check_zone`](Self::check_zone).
    pub fn total_memory(&self) -> u64 {
        self.inner.total.load(Ordering::Acquire)
    }

    /// Heap bytes in use, never above [`total_memory`](Self::total_memory).
    pub fn total_used(&self) -> u64 {
        self.inner
            .instrumentation
            .heap_used()
            .min(self.total_memory())
    }

    /// Heap bytes available.
    pub fn free_memory(&self) -> u64 {
        self.total_memory().saturating_sub(self.total_used())
    }

    /// Bytes counted as tenured, never above
    /// [`total_memory`](Self::total_memory).
    pub fn tenured_total_memory(&self) -> u64 {
        self.inner.tenured_total.load(Ordering::Acquire)
    }

    /// Tenured bytes in use, never above [`total_used`](Self::total_used).
    pub fn tenured_used(&self) -> u64 {
        let used = self.total_used();
        self.inner
            .instrumentation
            .tenured_pool()
            .map_or(used, |pool| pool.used.min(used))
    }

    /// Tenured bytes available.
    pub fn tenured_free_memory(&self) -> u64 {
        self.tenured_total_memory()
            .saturating_sub(self.tenured_used())
    }

    /// Threshold derived from the tenured total and collector constants.
    /// Never exceeds [`tenured_total_memory`](Self::tenured_total_memory).
    pub fn calculated_tenured_threshold(&self) -> u64 {
        self.threshold()
    }

    /// Threshold published by the last [`check_zone`](Self::check_zone).
    pub fn threshold(&self) -> u64 {
        self.inner.threshold.load(Ordering::Acquire)
    }

    /// Zone implied by current usage and the published threshold.
    pub fn zone(&self) -> MemoryZone {
        let threshold = self.threshold();
        if threshold > 0 && self.tenured_used() >= threshold {
            MemoryZone::Pressure
        } else {
            MemoryZone::Normal
        }
    }

    /// Recomputes totals and threshold from fresh readings and reports the
    /// resulting zone.
    pub fn check_zone(&self) -> MemoryZone {
        let instrumentation = &self.inner.instrumentation;
        let physical = instrumentation.physical_max();
        let pool = instrumentation.tenured_pool();

        let (tenured_total, threshold) = {
            let settings = self.inner.settings.lock();
            let total = settings.total(physical);
            let tenured_total = settings.tenured_total(total, pool.as_ref());
            let threshold = settings.defaults(pool.as_ref()).threshold(tenured_total);
            self.inner.total.store(total, Ordering::Release);
            self.inner.tenured_total.store(tenured_total, Ordering::Release);
            let previous = self.inner.threshold.swap(threshold, Ordering::AcqRel);
            instrumentation.set_usage_threshold(threshold);
            if previous != threshold {
                debug!(previous, threshold, tenured_total, "republished tenured threshold");
            }
            (tenured_total, threshold)
        };

        let tenured_used = self.tenured_used();
        metrics::record_memory_readings(tenured_used, tenured_total, threshold);

        let zone = self.zone();
        if zone == MemoryZone::Pressure {
            warn!(
                tenured_used,
                threshold, tenured_total, "tenured pool under memory pressure"
            );
        }
        zone
    }

    /// Severity of current pressure.
    ///
    /// Usage past the threshold is measured against the headroom between
    /// the threshold and the tenured total; each quarter of that headroom
    /// raises the tier by one.
    pub fn pressure_tier(&self) -> CostTier {
        let threshold = self.threshold();
        let used = self.tenured_used();
        if used < threshold {
            return CostTier::Low;
        }
        let headroom = self.tenured_total_memory().saturating_sub(threshold);
        if headroom == 0 {
            return CostTier::High;
        }
        let over = (used - threshold).min(headroom);
        let quartile = over.saturating_mul(4) / headroom;
        CostTier::from_units(quartile as usize + 1)
    }

    /// All readings at once.
    pub fn snapshot(&self) -> MemorySnapshot {
        let total = self.total_memory();
        let used = self.total_used();
        let tenured_total = self.tenured_total_memory();
        let tenured_used = self.tenured_used();
        MemorySnapshot {
            taken_at: Utc::now(),
            total,
            used,
            free: total.saturating_sub(used),
            tenured_total,
            tenured_used,
            tenured_free: tenured_total.saturating_sub(tenured_used),
            threshold: self.threshold(),
            collector: self.collector_family(),
            zone: self.zone(),
        }
    }

    // Collection

    /// Forwards a best-effort collection request to instrumentation.
    pub fn gc(&self) {
        self.inner.instrumentation.request_collection();
        self.inner.gc_count.fetch_add(1, Ordering::Relaxed);
        metrics::record_gc_request();
    }

    /// Number of [`gc`](Self::gc) calls so far.
    pub fn gc_count(&self) -> u64 {
        self.inner.gc_count.load(Ordering::Relaxed)
    }

    // Handlers

    /// Registers `handler` without keeping it alive. Dropping the last strong
    /// reference deregisters it on the next pass.
    pub fn add_handler<H>(&self, handler: &Arc<H>) -> HandlerId
    where
        H: MemoryHandler + 'static,
    {
        let weak: Weak<dyn MemoryHandler> = Arc::<H>::downgrade(handler);
        self.inner.handlers.lock().add(weak)
    }

    /// Deregisters a handler. Returns whether it was registered.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.inner.handlers.lock().remove(id)
    }

    /// Number of live registered handlers.
    pub fn handler_count(&self) -> usize {
        self.inner.handlers.lock().len()
    }

    /// Asks every handler to free memory at `tier`, in registration order.
    ///
    /// If the pool was under pressure when the call started, the pass stops
    /// as soon as pressure subsides; otherwise every handler runs.
    pub fn clear_memory(&self, tier: CostTier) -> Relief {
        let pressured = self.check_zone() == MemoryZone::Pressure;
        self.run_handlers(tier, pressured)
    }

    /// Runs handlers at [`pressure_tier`](Self::pressure_tier) if the pool is
    /// under pressure. Returns `None` when there was nothing to relieve.
    pub fn relieve_pressure(&self) -> Option<Relief> {
        if self.check_zone() != MemoryZone::Pressure {
            return None;
        }
        Some(self.run_handlers(self.pressure_tier(), true))
    }

    fn run_handlers(&self, tier: CostTier, stop_when_relieved: bool) -> Relief {
        let handlers = self.inner.handlers.lock().live();
        let mut relief = Relief::default();
        for handler in handlers {
            let released = handler.free_memory(tier);
            let label = handler.label();
            debug!(handler = %label, %tier, released, "memory handler invoked");
            metrics::record_handler_invocation(&label, tier);
            relief.handlers_invoked += 1;
            relief.released += released;
            if stop_when_relieved && self.zone() == MemoryZone::Normal {
                break;
            }
        }
        relief
    }
}

impl fmt::Debug for MemoryGovernor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryGovernor")
            .field("instrumentation", &self.inner.instrumentation)
            .field("settings", &*self.inner.settings.lock())
            .field("threshold", &self.threshold())
            .field("handlers", &*self.inner.handlers.lock())
            .field("gc_count", &self.gc_count())
            .finish()
    }
}
