//! Snapshots returned by the status service.

use serde::{Deserialize, Serialize};

/// One successful status fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot<S> {
    pub status: S,

    /// Server estimate of the total run time; only used for progress.
    #[serde(default, alias = "expectedDurationSeconds")]
    pub expected_duration_seconds: Option<f64>,
}

impl<S> StatusSnapshot<S> {
    pub fn new(status: S) -> Self {
        Self {
            status,
            expected_duration_seconds: None,
        }
    }

    pub fn with_expected_duration(mut self, seconds: f64) -> Self {
        self.expected_duration_seconds = Some(seconds);
        self
    }
}

/// Metrics detail, fetched only in metrics-bearing phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub epoch: u32,
    pub score: f64,
    #[serde(default, alias = "scoreMetricName")]
    pub score_metric_name: Option<String>,
}

impl MetricsSnapshot {
    pub fn new(epoch: u32, score: f64) -> Self {
        Self {
            epoch,
            score,
            score_metric_name: None,
        }
    }
}
