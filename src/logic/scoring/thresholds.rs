//! Static normal operating ranges

use serde::{Deserialize, Serialize};

/// Closed interval `[lo, hi]`. Values on either bound are normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalRange {
    pub lo: f64,
    pub hi: f64,
}

impl NormalRange {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    /// True when `v` lies outside the range. NaN is always out of range.
    pub fn is_anomalous(&self, v: f64) -> bool {
        !(self.lo <= v && v <= self.hi)
    }

    pub fn is_above(&self, v: f64) -> bool {
        v > self.hi
    }
}

pub const TEMPERATURE: NormalRange = NormalRange::new(50.0, 90.0);
pub const VIBRATION: NormalRange = NormalRange::new(0.1, 5.0);
pub const PRESSURE: NormalRange = NormalRange::new(0.8, 1.2);
pub const RPM: NormalRange = NormalRange::new(1000.0, 3000.0);

// Probability contributed by each category, evaluated in this order
pub const OVERHEATING_WEIGHT: f64 = 0.3;
pub const BEARING_WEIGHT: f64 = 0.4;
pub const PRESSURE_WEIGHT: f64 = 0.2;
pub const MOTOR_WEIGHT: f64 = 0.1;

pub const MAX_FAILURE_PROBABILITY: f64 = 0.95;
