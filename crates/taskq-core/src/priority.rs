use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduling priority of a task.
/// Higher numerical values are served first; the range is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(i32);

impl Priority {
    /// Lower bound of the high tier
    pub const HIGH_MIN: i32 = 200;

    /// Lower bound of the normal tier
    pub const NORMAL_MIN: i32 = 100;

    pub const fn new(value: i32) -> Self {
        Priority(value)
    }

    /// High priority (200)
    pub const fn high() -> Self {
        Priority(Self::HIGH_MIN)
    }

    /// Normal priority (100)
    pub const fn normal() -> Self {
        Priority(Self::NORMAL_MIN)
    }

    /// Low priority (0)
    pub const fn low() -> Self {
        Priority(0)
    }

    pub fn value(&self) -> i32 {
        self.0
    }

    /// Tier label, used for depth reporting and metric labels
    pub fn tier(&self) -> &'static str {
        if self.is_high() {
            "high"
        } else if self.is_normal() {
            "normal"
        } else {
            "low"
        }
    }

    pub fn is_high(&self) -> bool {
        self.0 >= Self::HIGH_MIN
    }

    pub fn is_normal(&self) -> bool {
        (Self::NORMAL_MIN..Self::HIGH_MIN).contains(&self.0)
    }

    pub fn is_low(&self) -> bool {
        self.0 < Self::NORMAL_MIN
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::normal()
    }
}

impl From<i32> for Priority {
    fn from(value: i32) -> Self {
        Priority(value)
    }
}

impl From<Priority> for i32 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
