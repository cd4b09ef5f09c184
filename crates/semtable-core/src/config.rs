//! Loop configuration

use std::time::Duration;

/// Delay between loop iterations in the reference programs
pub const DEFAULT_PACE: Duration = Duration::from_secs(1);

/// Slice length for cancellable waits
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Settings shared by the producer and consumer loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Sleep after each completed iteration; zero disables pacing
    pub pace: Duration,
    /// Upper bound on how long a cancel can go unnoticed while blocked
    pub poll_interval: Duration,
    /// Stop after this many items; `None` runs until cancelled
    pub limit: Option<u64>,
}

impl LoopConfig {
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        // A zero slice would turn every wait into a spin.
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            pace: DEFAULT_PACE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = LoopConfig::default();
        assert_eq!(cfg.pace, Duration::from_secs(1));
        assert_eq!(cfg.limit, None);
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let cfg = LoopConfig::default().with_poll_interval(Duration::ZERO);
        assert_eq!(cfg.poll_interval, Duration::from_millis(1));
    }
}
