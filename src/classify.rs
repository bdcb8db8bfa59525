//! Crowd level classification and occupancy.
//!
//! A coach's level is a pure function of its person count and two cutoffs.
//! Occupancy is the count relative to the coach capacity, clamped to 100.

use serde::{Deserialize, Serialize};

pub const DEFAULT_EMPTY_MAX: u32 = 3;
pub const DEFAULT_MODERATE_MAX: u32 = 7;
pub const DEFAULT_CAPACITY: u32 = 30;

/// Ordered crowd levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CrowdLevel {
    #[default]
    #[serde(alias = "empty")]
    Empty,
    #[serde(alias = "moderate")]
    Moderate,
    #[serde(alias = "crowded")]
    Crowded,
}

impl CrowdLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrowdLevel::Empty => "Empty",
            CrowdLevel::Moderate => "Moderate",
            CrowdLevel::Crowded => "Crowded",
        }
    }
}

impl std::fmt::Display for CrowdLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a person count against the two cutoffs.
///
/// Negative counts fall into `Empty`.
pub fn classify(count: i64, empty_max: i64, moderate_max: i64) -> CrowdLevel {
    if count <= empty_max {
        CrowdLevel::Empty
    } else if count <= moderate_max {
        CrowdLevel::Moderate
    } else {
        CrowdLevel::Crowded
    }
}

/// Per-coach cutoffs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    pub empty_max: u32,
    pub moderate_max: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            empty_max: DEFAULT_EMPTY_MAX,
            moderate_max: DEFAULT_MODERATE_MAX,
        }
    }
}

impl Thresholds {
    pub fn level(&self, count: u32) -> CrowdLevel {
        classify(
            i64::from(count),
            i64::from(self.empty_max),
            i64::from(self.moderate_max),
        )
    }
}

/// `min(100, round(100 * count / capacity))`, rounding half to even.
///
/// A zero capacity is replaced by [`DEFAULT_CAPACITY`].
pub fn occupancy_percent(count: u32, capacity: u32) -> u8 {
    let capacity = if capacity == 0 {
        DEFAULT_CAPACITY
    } else {
        capacity
    };
    let ratio = f64::from(count) * 100.0 / f64::from(capacity);
    ratio.round_ties_even().clamp(0.0, 100.0) as u8
}
