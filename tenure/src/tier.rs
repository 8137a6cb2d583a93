use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered severity of a reclamation request.
///
/// Higher tiers ask handlers for proportionally more aggressive eviction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    /// Cheap housekeeping.
    #[default]
    Low = 1,
    /// Moderate pressure.
    MediumLow = 2,
    /// Sustained pressure.
    MediumHigh = 3,
    /// Near exhaustion; drop everything that can be rebuilt.
    High = 4,
}

impl CostTier {
    /// Every tier, least severe first.
    pub const ALL: [CostTier; 4] = [
        CostTier::Low,
        CostTier::MediumLow,
        CostTier::MediumHigh,
        CostTier::High,
    ];

    /// Number of cost units this tier represents (1..=4).
    pub fn units(self) -> usize {
        self as usize
    }

    /// Tier for `units`, clamped into 1..=4.
    pub fn from_units(units: usize) -> Self {
        match units {
            0 | 1 => Self::Low,
            2 => Self::MediumLow,
            3 => Self::MediumHigh,
            _ => Self::High,
        }
    }

    /// Stable lowercase name, used as a metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::MediumLow => "medium_low",
            Self::MediumHigh => "medium_high",
            Self::High => "high",
        }
    }
}

impl fmt::Display for CostTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered_by_severity() {
        assert!(CostTier::Low < CostTier::MediumLow);
        assert!(CostTier::MediumHigh < CostTier::High);
        assert_eq!(CostTier::from_units(9), CostTier::High);
        assert_eq!(CostTier::from_units(CostTier::MediumLow.units()), CostTier::MediumLow);
    }
}
