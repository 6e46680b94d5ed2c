//! Engine timing configuration

use std::time::Duration;

/// Timing knobs for the tracker and the health waiters. Production uses
/// one-second polls with an hour's budget; tests shrink both.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between remote-task observations and health polls.
    pub poll_interval: Duration,

    /// Budget, in poll ticks, for one remote task to reach a terminal
    /// status.
    pub tracker_budget_ticks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            tracker_budget_ticks: 3600,
        }
    }
}

impl EngineConfig {
    /// Fast timings for tests.
    pub fn fast() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            tracker_budget_ticks: 50,
        }
    }
}
