//! Timeout configuration for fetch operations.

use std::time::Duration;

/// Timeout configuration for a network attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Connection establishment timeout.
    pub connect: Duration,
    /// Total time allowed for one attempt, including the body.
    pub total: Duration,
}

impl TimeoutConfig {
    /// Create a new timeout configuration.
    pub fn new(connect: Duration, total: Duration) -> Self {
        Self {
            connect: connect.min(total),
            total,
        }
    }

    /// Create from a single total timeout.
    pub fn from_total(total: Duration) -> Self {
        Self {
            connect: total / 2,
            total,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::from_total(Duration::from_millis(3000))
    }
}
