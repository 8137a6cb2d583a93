//! Sources of memory readings for the governor.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use smol_str::SmolStr;

/// Usage of the tenured (old-generation) pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolUsage {
    /// Name reported by the runtime, used to detect the collector family.
    pub name: SmolStr,
    /// Bytes in use.
    pub used: u64,
    /// Pool ceiling in bytes, if the runtime bounds it.
    pub max: Option<u64>,
}

/// Runtime memory instrumentation consulted by the governor.
///
/// Readings are point-in-time and may be slightly stale; implementations
/// must never fail or block for long.
pub trait MemoryInstrumentation: Send + Sync + fmt::Debug {
    /// Physical ceiling of the managed heap in bytes.
    fn physical_max(&self) -> u64;

    /// Bytes in use across the whole heap.
    fn heap_used(&self) -> u64;

    /// The tenured pool, or `None` when the runtime has no generational heap.
    fn tenured_pool(&self) -> Option<PoolUsage>;

    /// Publishes the usage threshold above which the runtime should signal
    /// the tenured pool as nearly full.
    fn set_usage_threshold(&self, bytes: u64);

    /// Best-effort request for a full collection. May do nothing.
    fn request_collection(&self);
}

/// Instrumentation with settable readings, for tests and embedders that
/// measure memory themselves.
#[derive(Debug)]
pub struct SyntheticInstrumentation {
    physical_max: AtomicU64,
    heap_used: AtomicU64,
    pool: Mutex<Option<PoolUsage>>,
    threshold: AtomicU64,
    collections: AtomicU64,
}

impl SyntheticInstrumentation {
    /// Creates instrumentation with a heap of `physical_max` bytes and no
    /// tenured pool.
    pub fn new(physical_max: u64) -> Self {
        Self {
            physical_max: AtomicU64::new(physical_max),
            heap_used: AtomicU64::new(0),
            pool: Mutex::new(None),
            threshold: AtomicU64::new(0),
            collections: AtomicU64::new(0),
        }
    }

    /// Adds a tenured pool named `name` bounded by `max`.
    pub fn with_pool(self, name: impl Into<SmolStr>, max: Option<u64>) -> Self {
        *self.pool.lock() = Some(PoolUsage {
            name: name.into(),
            used: 0,
            max,
        });
        self
    }

    /// Sets the whole-heap usage.
    pub fn set_heap_used(&self, bytes: u64) {
        self.heap_used.store(bytes, Ordering::Relaxed);
    }

    /// Sets the tenured pool usage. Without a pool this is ignored.
    pub fn set_tenured_used(&self, bytes: u64) {
        if let Some(pool) = self.pool.lock().as_mut() {
            pool.used = bytes;
        }
    }

    /// Sets the physical ceiling.
    pub fn set_physical_max(&self, bytes: u64) {
        self.physical_max.store(bytes, Ordering::Relaxed);
    }

    /// Last threshold published by the governor.
    pub fn published_threshold(&self) -> u64 {
        self.threshold.load(Ordering::Relaxed)
    }

    /// Number of collection requests received.
    pub fn collection_requests(&self) -> u64 {
        self.collections.load(Ordering::Relaxed)
    }
}

impl MemoryInstrumentation for SyntheticInstrumentation {
    fn physical_max(&self) -> u64 {
        self.physical_max.load(Ordering::Relaxed)
    }

    fn heap_used(&self) -> u64 {
        self.heap_used.load(Ordering::Relaxed)
    }

    fn tenured_pool(&self) -> Option<PoolUsage> {
        self.pool.lock().clone()
    }

    fn set_usage_threshold(&self, bytes: u64) {
        self.threshold.store(bytes, Ordering::Relaxed);
    }

    fn request_collection(&self) {
        self.collections.fetch_add(1, Ordering::Relaxed);
    }
}

/// Instrumentation reading the current process from `/proc`.
///
/// The heap ceiling is `MemTotal` from `/proc/meminfo`, usage is `VmRSS`
/// from `/proc/self/status`. The whole process is reported as one
/// pool named `"process"`. On platforms without `/proc` every reading is zero.
#[derive(Debug, Default)]
pub struct ProcessInstrumentation {
    threshold: AtomicU64,
}

impl ProcessInstrumentation {
    /// Creates process instrumentation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last threshold published by the governor.
    pub fn published_threshold(&self) -> u64 {
        self.threshold.load(Ordering::Relaxed)
    }

    fn meminfo_total() -> Option<u64> {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        kib_field(&meminfo, "MemTotal:")
    }

    fn resident_bytes() -> Option<u64> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        kib_field(&status, "VmRSS:")
    }
}

/// Parses a `Name:   1234 kB` line of a `/proc` file into bytes.
fn kib_field(text: &str, name: &str) -> Option<u64> {
    text.lines()
        .find_map(|line| line.strip_prefix(name))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
        .map(|kib| kib * 1024)
}

impl MemoryInstrumentation for ProcessInstrumentation {
    fn physical_max(&self) -> u64 {
        Self::meminfo_total().unwrap_or(0)
    }

    fn heap_used(&self) -> u64 {
        Self::resident_bytes().unwrap_or(0)
    }

    fn tenured_pool(&self) -> Option<PoolUsage> {
        Some(PoolUsage {
            name: SmolStr::new_static("process"),
            used: self.heap_used(),
            max: None,
        })
    }

    fn set_usage_threshold(&self, bytes: u64) {
        self.threshold.store(bytes, Ordering::Relaxed);
    }

    fn request_collection(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kib_field_reads_named_line() {
        let status = "Name:\ttenure\nVmPeak:\t  204800 kB\nVmRSS:\t   10240 kB\nThreads:\t4\n";
        assert_eq!(kib_field(status, "VmRSS:"), Some(10240 * 1024));
        assert_eq!(kib_field(status, "VmPeak:"), Some(204800 * 1024));
        assert_eq!(kib_field(status, "VmSwap:"), None);
        assert_eq!(kib_field("VmRSS:\tnone kB\n", "VmRSS:"), None);
    }

    #[test]
    fn process_readings_are_consistent() {
        let process = ProcessInstrumentation::new();
        let pool = process.tenured_pool().expect("process pool");
        assert_eq!(pool.name, "process");
        if cfg!(target_os = "linux") {
            assert!(process.physical_max() > 0);
            assert!(process.heap_used() > 0);
        }
    }
}
