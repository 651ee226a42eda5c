//! Tracker configuration.

use std::time::Duration;

use super::policy::FailurePolicy;

/// Runtime knobs shared by every Poller of one tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Delay between two successful cycles.
    pub poll_interval: Duration,

    /// Reaction to soft failures and transport errors.
    pub failure_policy: FailurePolicy,

    /// Upper bound for one fetch; `None` waits forever.
    pub fetch_timeout: Option<Duration>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            failure_policy: FailurePolicy::Halt,
            fetch_timeout: Some(Duration::from_secs(30)),
        }
    }
}
