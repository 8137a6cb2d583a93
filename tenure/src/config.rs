//! Governor configuration.

use std::time::Duration;

use bounded_integer::bounded_integer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::governor::CollectorDefaults;

bounded_integer! {
    /// Whole percentage (0-100).
    #[repr(u8)]
    pub struct Percent { 0..=100 }
}

/// Converts `value` to a [`Percent`], clamping anything above 100.
pub fn percent(value: u8) -> Percent {
    Percent::new(value.min(100)).unwrap_or(Percent::MAX)
}

/// Errors raised when a [`MemoryConfig`] is inconsistent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Both an absolute and a relative tenured size were given.
    #[error("tenured_size and tenured_percent are mutually exclusive")]
    ConflictingTenuredSizing,

    /// Collector override reserves more than its occupancy fraction.
    #[error("reserve percent {reserve}% exceeds occupancy fraction {occupancy}%")]
    ReserveExceedsOccupancy {
        /// Configured occupancy fraction.
        occupancy: u8,
        /// Configured reserve percent.
        reserve: u8,
    },

    /// The monitor cannot tick with a zero period.
    #[error("monitor_interval must be positive")]
    ZeroMonitorInterval,
}

/// Startup configuration for a [`MemoryGovernor`](crate::MemoryGovernor).
///
/// Every field is optional in serialized form:
///
/// ```
/// use std::time::Duration;
/// use tenure::MemoryConfig;
///
/// let config: MemoryConfig = serde_json::from_str(r#"{
///     "max_memory": 1073741824,
///     "tenured_percent": 60,
///     "monitor_interval": "250ms"
/// }"#).unwrap();
///
/// assert_eq!(config.tenured_percent.map(|p| p.get()), Some(60));
/// assert_eq!(config.monitor_interval, Duration::from_millis(250));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Ceiling for the managed heap in bytes; clamped to the physical maximum.
    /// `None` uses the physical maximum.
    pub max_memory: Option<u64>,
    /// Absolute tenured size in bytes. `None` derives it automatically.
    pub tenured_size: Option<u64>,
    /// Tenured size as a share of total memory. `None` derives it automatically.
    pub tenured_percent: Option<Percent>,
    /// Replaces the occupancy/reserve constants of the detected collector.
    pub collector: Option<CollectorDefaults>,
    /// Period of the background pressure monitor (e.g. `"1s"`, `"500ms"`).
    #[serde(with = "humantime_serde")]
    pub monitor_interval: Duration,
}

impl MemoryConfig {
    /// Default period of the background monitor.
    pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(1);

    /// Create a new builder for MemoryConfig.
    pub fn builder() -> MemoryConfigBuilder {
        MemoryConfigBuilder::default()
    }

    /// Checks the fields for contradictions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tenured_size.is_some() && self.tenured_percent.is_some() {
            return Err(ConfigError::ConflictingTenuredSizing);
        }
        if let Some(collector) = &self.collector {
            let (occupancy, reserve) = (
                collector.occupancy_fraction.get(),
                collector.reserve_percent.get(),
            );
            if reserve > occupancy {
                return Err(ConfigError::ReserveExceedsOccupancy { occupancy, reserve });
            }
        }
        if self.monitor_interval.is_zero() {
            return Err(ConfigError::ZeroMonitorInterval);
        }
        Ok(())
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_memory: None,
            tenured_size: None,
            tenured_percent: None,
            collector: None,
            monitor_interval: Self::DEFAULT_MONITOR_INTERVAL,
        }
    }
}

/// Builder for MemoryConfig.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigBuilder {
    config: MemoryConfig,
}

impl MemoryConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the managed heap ceiling in bytes.
    pub fn max_memory(self, bytes: u64) -> Self {
        Self {
            config: MemoryConfig {
                max_memory: Some(bytes),
                ..self.config
            },
        }
    }

    /// Set an absolute tenured size in bytes.
    pub fn tenured_size(self, bytes: u64) -> Self {
        Self {
            config: MemoryConfig {
                tenured_size: Some(bytes),
                ..self.config
            },
        }
    }

    /// Set the tenured size as a percentage of total memory (clamped to 100).
    pub fn tenured_percent(self, value: u8) -> Self {
        Self {
            config: MemoryConfig {
                tenured_percent: Some(percent(value)),
                ..self.config
            },
        }
    }

    /// Override the collector's occupancy and reserve constants.
    pub fn collector(self, defaults: CollectorDefaults) -> Self {
        Self {
            config: MemoryConfig {
                collector: Some(defaults),
                ..self.config
            },
        }
    }

    /// Set the background monitor period.
    pub fn monitor_interval(self, interval: Duration) -> Self {
        Self {
            config: MemoryConfig {
                monitor_interval: interval,
                ..self.config
            },
        }
    }

    /// Build the MemoryConfig.
    pub fn build(self) -> MemoryConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_clamps_above_hundred() {
        assert_eq!(percent(250).get(), 100);
        assert_eq!(percent(42).get(), 42);
    }

    #[test]
    fn conflicting_sizing_is_rejected() {
        let config = MemoryConfig::builder()
            .tenured_size(1 << 20)
            .tenured_percent(50)
            .build();
        assert_eq!(config.validate(), Err(ConfigError::ConflictingTenuredSizing));
    }

    #[test]
    fn reserve_above_occupancy_is_rejected() {
        let config = MemoryConfig::builder()
            .collector(CollectorDefaults::new(30, 40))
            .build();
        assert_eq!(
            config.validate(),
            Err(ConfigError::ReserveExceedsOccupancy {
                occupancy: 30,
                reserve: 40
            })
        );
    }
}
