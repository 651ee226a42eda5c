//! Metric derivation: snapshot + start time -> elapsed, progress, trend point.
//!
//! Pure functions only; the caller decides what to persist.

use chrono::{DateTime, Utc};

use super::record::{LatestMetrics, MetricPoint};
use super::snapshot::MetricsSnapshot;

/// Values derived from one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMetrics {
    pub elapsed_minutes: f64,
    pub progress_percent: f64,
    pub latest_metrics: Option<LatestMetrics>,
    /// New trend entry; the resulting trend is `existing ++ appended`.
    pub appended: Option<MetricPoint>,
}

/// Minutes between `start_time` and `now`, never negative.
pub fn elapsed_minutes(start_time: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - start_time).num_milliseconds();
    (millis as f64 / 60_000.0).max(0.0)
}

/// `elapsed / expected * 100`, clamped to `0..=100`.
///
/// Unknown, zero or non-finite expected durations yield 0.
pub fn progress_percent(elapsed_minutes: f64, expected_duration_seconds: Option<f64>) -> f64 {
    match expected_duration_seconds {
        Some(seconds) if seconds.is_finite() && seconds > 0.0 => {
            let expected_minutes = seconds / 60.0;
            (elapsed_minutes / expected_minutes * 100.0).clamp(0.0, 100.0)
        }
        _ => 0.0,
    }
}

/// Derive every computed field of a poll.
///
/// The same epoch reported twice produces two trend points.
pub fn derive(
    start_time: DateTime<Utc>,
    now: DateTime<Utc>,
    expected_duration_seconds: Option<f64>,
    snapshot: Option<&MetricsSnapshot>,
    existing_trend: &[MetricPoint],
) -> DerivedMetrics {
    let elapsed = elapsed_minutes(start_time, now);
    let progress = progress_percent(elapsed, expected_duration_seconds);

    let latest_metrics = snapshot.map(|s| LatestMetrics {
        epoch: s.epoch,
        score: s.score,
        score_metric_name: s.score_metric_name.clone(),
    });

    // 時計が巻き戻っても trend の time は単調非減少に保つ
    let appended = snapshot.map(|s| {
        let floor = existing_trend.last().map_or(0.0, |p| p.time);
        MetricPoint {
            time: elapsed.max(floor),
            value: s.score,
        }
    });

    DerivedMetrics {
        elapsed_minutes: elapsed,
        progress_percent: progress,
        latest_metrics,
        appended,
    }
}
