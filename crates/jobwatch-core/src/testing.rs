//! Test doubles for the app layer.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::domain::{
    FetchError, JobId, JobStatus, MetricsSnapshot, StatusSnapshot, TaskRecord, TrackerError,
};
use crate::impls::InMemoryStorage;
use crate::ports::{CompletionHook, ManualClock, RecordStorage, StatusClient};

/// Replays a script of answers. The last entry of each script repeats forever.
pub(crate) struct ScriptedClient<S> {
    statuses: Mutex<VecDeque<Result<StatusSnapshot<S>, FetchError>>>,
    metrics: Mutex<VecDeque<Result<MetricsSnapshot, FetchError>>>,
    status_calls: AtomicUsize,
    metrics_calls: AtomicUsize,
    step: Option<(ManualClock, chrono::Duration)>,
    hang: bool,
}

impl<S: JobStatus> ScriptedClient<S> {
    pub(crate) fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            metrics: Mutex::new(VecDeque::new()),
            status_calls: AtomicUsize::new(0),
            metrics_calls: AtomicUsize::new(0),
            step: None,
            hang: false,
        }
    }

    /// Never answers.
    pub(crate) fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    pub(crate) fn status(self, status: S) -> Self {
        self.snapshot(StatusSnapshot::new(status))
    }

    pub(crate) fn snapshot(self, snapshot: StatusSnapshot<S>) -> Self {
        self.statuses.lock().unwrap().push_back(Ok(snapshot));
        self
    }

    pub(crate) fn status_error(self, err: FetchError) -> Self {
        self.statuses.lock().unwrap().push_back(Err(err));
        self
    }

    pub(crate) fn metrics(self, epoch: u32, score: f64) -> Self {
        self.metrics
            .lock()
            .unwrap()
            .push_back(Ok(MetricsSnapshot::new(epoch, score)));
        self
    }

    pub(crate) fn metrics_error(self, err: FetchError) -> Self {
        self.metrics.lock().unwrap().push_back(Err(err));
        self
    }

    /// Move `clock` forward by `step` on every status fetch.
    pub(crate) fn advancing(mut self, clock: ManualClock, step: chrono::Duration) -> Self {
        self.step = Some((clock, step));
        self
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }
}

fn next<T: Clone>(script: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut script = script.lock().unwrap();
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

#[async_trait]
impl<S: JobStatus> StatusClient<S> for ScriptedClient<S> {
    async fn fetch_status(&self, _job_id: &JobId) -> Result<StatusSnapshot<S>, FetchError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some((clock, step)) = &self.step {
            clock.advance(*step);
        }
        next(&self.statuses).unwrap_or_else(|| Err(FetchError::Transport("script is empty".into())))
    }

    async fn fetch_metrics(&self, _job_id: &JobId) -> Result<MetricsSnapshot, FetchError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        next(&self.metrics).unwrap_or_else(|| Err(FetchError::Transport("script is empty".into())))
    }
}

/// Counts completion calls; optionally fails every call.
#[derive(Default)]
pub(crate) struct CountingHook {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingHook {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: JobStatus> CompletionHook<S> for CountingHook {
    async fn on_terminal_success(&self, _record: &TaskRecord<S>) -> Result<(), TrackerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::SoftFailure { http_status: 503 }.into());
        }
        Ok(())
    }
}

/// InMemoryStorage whose `save` can be switched to fail.
#[derive(Default)]
pub(crate) struct FlakyStorage {
    inner: InMemoryStorage,
    failing: AtomicBool,
}

impl FlakyStorage {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// What was last saved successfully under `key`.
    pub(crate) async fn saved(&self, key: &str) -> Option<String> {
        self.inner.load(key).await.unwrap_or(None)
    }
}

#[async_trait]
impl RecordStorage for FlakyStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, TrackerError> {
        self.inner.load(key).await
    }

    async fn save(&self, key: &str, value: &str) -> Result<(), TrackerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TrackerError::storage(key, "disk full"));
        }
        self.inner.save(key, value).await
    }
}
