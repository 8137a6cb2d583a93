use serde::{Deserialize, Serialize};

use crate::config::{Percent, percent};

/// Garbage-collector family owning the tenured pool.
///
/// Detected from the pool name reported by instrumentation; selects the
/// occupancy and reserve constants used when no override is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorFamily {
    /// Single-threaded mark-compact (`"Tenured Gen"`).
    Serial,
    /// Throughput collector (`"PS Old Gen"`).
    Parallel,
    /// Concurrent mark-sweep (`"CMS Old Gen"`).
    ConcurrentMarkSweep,
    /// Region-based collector (`"G1 Old Gen"`).
    G1,
    /// Whole-process accounting with no generational pool.
    Process,
    /// Unrecognised pool name.
    Unknown,
}

impl CollectorFamily {
    /// Maps a tenured pool name to its collector family.
    ///
    /// ```
    /// use tenure::CollectorFamily;
    ///
    /// assert_eq!(CollectorFamily::from_pool_name("G1 Old Gen"), CollectorFamily::G1);
    /// assert_eq!(CollectorFamily::from_pool_name("PS Old Gen"), CollectorFamily::Parallel);
    /// assert_eq!(CollectorFamily::from_pool_name("Metaspace"), CollectorFamily::Unknown);
    /// ```
    pub fn from_pool_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.contains("g1") {
            Self::G1
        } else if name.contains("cms") || name.contains("concurrent mark") {
            Self::ConcurrentMarkSweep
        } else if name.starts_with("ps ") || name.contains("parallel") {
            Self::Parallel
        } else if name.contains("tenured") || name.contains("serial") {
            Self::Serial
        } else if name.contains("process") {
            Self::Process
        } else {
            Self::Unknown
        }
    }

    /// Occupancy and reserve constants for this family.
    pub fn defaults(self) -> CollectorDefaults {
        match self {
            Self::Serial | Self::Parallel => CollectorDefaults::new(90, 5),
            Self::ConcurrentMarkSweep => CollectorDefaults::new(92, 7),
            Self::G1 => CollectorDefaults::new(85, 10),
            Self::Process | Self::Unknown => CollectorDefaults::new(80, 10),
        }
    }
}

/// Tuning constants behind the tenured threshold.
///
/// The threshold is `occupancy_fraction` percent of the tenured total minus
/// `reserve_percent` percent of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorDefaults {
    /// Share of the tenured pool the collector tolerates before a full pass.
    pub occupancy_fraction: Percent,
    /// Share held back as headroom for allocation during collection.
    pub reserve_percent: Percent,
}

impl CollectorDefaults {
    /// Creates defaults from whole percentages, clamping each to 100.
    pub fn new(occupancy_fraction: u8, reserve_percent: u8) -> Self {
        Self {
            occupancy_fraction: percent(occupancy_fraction),
            reserve_percent: percent(reserve_percent),
        }
    }

    /// Threshold in bytes for a tenured pool of `tenured_total` bytes. Never
    /// exceeds `tenured_total`.
    pub fn threshold(&self, tenured_total: u64) -> u64 {
        let unit = tenured_total / 100;
        let occupied = unit * u64::from(self.occupancy_fraction.get());
        let reserved = unit * u64::from(self.reserve_percent.get());
        occupied.saturating_sub(reserved).min(tenured_total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_names_map_to_families() {
        assert_eq!(
            CollectorFamily::from_pool_name("CMS Old Gen"),
            CollectorFamily::ConcurrentMarkSweep
        );
        assert_eq!(
            CollectorFamily::from_pool_name("Tenured Gen"),
            CollectorFamily::Serial
        );
        assert_eq!(
            CollectorFamily::from_pool_name("process"),
            CollectorFamily::Process
        );
    }

    #[test]
    fn threshold_never_exceeds_tenured_total() {
        let defaults = CollectorDefaults::new(100, 0);
        assert_eq!(defaults.threshold(1_000), 1_000);
        assert_eq!(CollectorDefaults::new(85, 10).threshold(1_000), 750);
        assert_eq!(CollectorDefaults::new(5, 90).threshold(1_000), 0);
        assert_eq!(CollectorDefaults::new(90, 5).threshold(0), 0);
    }
}
