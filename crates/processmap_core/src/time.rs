//! Logical durations for processmap.
//!
//! Activity durations are counted in abstract ticks. A scheduler decides
//! what a tick means; the compiler only carries the number along.

use serde::{Deserialize, Serialize};

/// Non-negative logical duration of an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticks(u64);

impl Ticks {
    /// Zero duration
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Create from raw value
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Get raw value
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Check if this is the zero duration
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Saturating addition
    #[must_use]
    pub const fn saturating_add(&self, other: Ticks) -> Ticks {
        Ticks(self.0.saturating_add(other.0))
    }
}

impl Default for Ticks {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Ticks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}t", self.0)
    }
}

impl From<u64> for Ticks {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<u32> for Ticks {
    fn from(value: u32) -> Self {
        Self(u64::from(value))
    }
}
