//! Task record: the persisted snapshot of one tracked job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{CorrelationId, JobId, PollerToken};
use super::status::JobStatus;

/// One point of the metric trend (`time` in elapsed minutes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub time: f64,
    pub value: f64,
}

/// Latest metrics reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestMetrics {
    pub epoch: u32,
    pub score: f64,
    #[serde(default)]
    pub score_metric_name: Option<String>,
}

/// Metadata for a tracked job.
///
/// Design:
/// - One record per `job_id`; `job_id`, `correlation_id`, `start_time` never change.
/// - `metric_trend` is append-only.
/// - Only the job's Poller (through the store) mutates the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord<S> {
    pub job_id: JobId,
    pub correlation_id: CorrelationId,
    pub status: S,

    /// Set once at first creation, survives restarts.
    pub start_time: DateTime<Utc>,

    pub elapsed_minutes: f64,

    /// 0..=100, zero while the server has not reported an expected duration.
    pub progress_percent: f64,

    #[serde(default)]
    pub latest_metrics: Option<LatestMetrics>,

    #[serde(default)]
    pub metric_trend: Vec<MetricPoint>,

    #[serde(default)]
    pub expected_duration_seconds: Option<f64>,

    /// Token of the Poller chain currently observing this job.
    #[serde(default)]
    pub active_poller: Option<PollerToken>,

    /// Whether the terminal-success hook has already been invoked.
    #[serde(default)]
    pub completion_fired: bool,

    /// Why the last chain halted (cleared by the next successful poll).
    #[serde(default)]
    pub last_error: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl<S: JobStatus> TaskRecord<S> {
    pub fn new(job_id: JobId, correlation_id: CorrelationId, now: DateTime<Utc>) -> Self {
        Self {
            job_id,
            correlation_id,
            status: S::initial(),
            start_time: now,
            elapsed_minutes: 0.0,
            progress_percent: 0.0,
            latest_metrics: None,
            metric_trend: Vec::new(),
            expected_duration_seconds: None,
            active_poller: None,
            completion_fired: false,
            last_error: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge a patch into this record.
    ///
    /// Status moves are only applied when they are legal forward moves;
    /// trend points are appended, never replaced.
    pub fn apply(&mut self, patch: TaskPatch<S>, now: DateTime<Utc>) {
        if let Some(status) = patch.status
            && self.status.can_transition_to(status)
        {
            self.status = status;
        }
        if let Some(elapsed) = patch.elapsed_minutes {
            self.elapsed_minutes = elapsed;
        }
        if let Some(progress) = patch.progress_percent {
            self.progress_percent = progress;
        }
        if let Some(metrics) = patch.latest_metrics {
            self.latest_metrics = Some(metrics);
        }
        if patch.expected_duration_seconds.is_some() {
            self.expected_duration_seconds = patch.expected_duration_seconds;
        }
        if let Some(last_error) = patch.last_error {
            self.last_error = last_error;
        }
        self.metric_trend.extend(patch.append_trend);
        self.updated_at = now;
    }
}

/// Partial update merged into a [`TaskRecord`].
///
/// `None` means "leave as is". Poller bookkeeping (`active_poller`,
/// `completion_fired`) is not patchable; the store owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPatch<S> {
    pub status: Option<S>,
    pub elapsed_minutes: Option<f64>,
    pub progress_percent: Option<f64>,
    pub latest_metrics: Option<LatestMetrics>,
    pub expected_duration_seconds: Option<f64>,
    pub append_trend: Vec<MetricPoint>,
    /// `Some(None)` clears the error.
    pub last_error: Option<Option<String>>,
}

impl<S> Default for TaskPatch<S> {
    fn default() -> Self {
        Self {
            status: None,
            elapsed_minutes: None,
            progress_percent: None,
            latest_metrics: None,
            expected_duration_seconds: None,
            append_trend: Vec::new(),
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TrainingStatus;
    use chrono::TimeZone;

    fn record() -> TaskRecord<TrainingStatus> {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        TaskRecord::new(
            JobId::parse("exp-1").unwrap(),
            CorrelationId::parse("model-1").unwrap(),
            now,
        )
    }

    #[test]
    fn new_record_starts_in_initial_status() {
        let rec = record();
        assert_eq!(rec.status, TrainingStatus::SettingUp);
        assert_eq!(rec.progress_percent, 0.0);
        assert!(rec.metric_trend.is_empty());
        assert!(!rec.is_terminal());
    }

    #[test]
    fn apply_ignores_regressing_status() {
        let mut rec = record();
        let now = rec.start_time;
        rec.apply(
            TaskPatch {
                status: Some(TrainingStatus::Training),
                ..TaskPatch::default()
            },
            now,
        );
        rec.apply(
            TaskPatch {
                status: Some(TrainingStatus::DownloadingData),
                ..TaskPatch::default()
            },
            now,
        );
        assert_eq!(rec.status, TrainingStatus::Training);
    }

    #[test]
    fn apply_appends_trend_points() {
        let mut rec = record();
        let now = rec.start_time;
        for t in [1.0, 2.0] {
            rec.apply(
                TaskPatch {
                    append_trend: vec![MetricPoint { time: t, value: 0.5 }],
                    ..TaskPatch::default()
                },
                now,
            );
        }
        assert_eq!(rec.metric_trend.len(), 2);
        assert_eq!(rec.metric_trend[0].time, 1.0);
    }

    #[test]
    fn last_error_can_be_cleared() {
        let mut rec = record();
        let now = rec.start_time;
        rec.apply(
            TaskPatch {
                last_error: Some(Some("http 500".into())),
                ..TaskPatch::default()
            },
            now,
        );
        assert_eq!(rec.last_error.as_deref(), Some("http 500"));

        rec.apply(
            TaskPatch {
                last_error: Some(None),
                ..TaskPatch::default()
            },
            now,
        );
        assert_eq!(rec.last_error, None);
    }

    #[test]
    fn older_records_without_bookkeeping_fields_still_load() {
        let json = r#"{
            "job_id": "exp-1",
            "correlation_id": "model-1",
            "status": "TRAINING",
            "start_time": "2024-01-01T12:00:00Z",
            "elapsed_minutes": 3.0,
            "progress_percent": 10.0,
            "updated_at": "2024-01-01T12:03:00Z"
        }"#;
        let rec: TaskRecord<TrainingStatus> = serde_json::from_str(json).unwrap();
        assert_eq!(rec.status, TrainingStatus::Training);
        assert!(rec.metric_trend.is_empty());
        assert_eq!(rec.active_poller, None);
        assert!(!rec.completion_fired);
    }
}
