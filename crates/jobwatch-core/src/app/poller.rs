//! Poller - ジョブ 1 件ごとの観測ループ
//!
//! # フロー（1 サイクル）
//! 1. StatusClient::fetch_status() で現在の状態を取得
//! 2. 失敗したら FailurePolicy に従って停止 or バックオフ
//! 3. メトリクスを取る段階なら fetch_metrics() も呼ぶ
//! 4. Metric Deriver で経過時間・進捗・trend を計算
//! 5. TaskRecordStore::apply_poll() でマージ（トークンが古ければ何もしない）
//! 6. 終端なら停止、そうでなければ poll_interval 後に次のサイクル
//!
//! サイクル n+1 はサイクル n のストア更新が終わるまで始まりません。

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::config::TrackerConfig;
use super::policy::FailureDecision;
use super::store::TaskRecordStore;
use crate::domain::{
    FetchError, JobId, JobStatus, MetricsSnapshot, PollerToken, StatusSnapshot, TaskPatch,
    TrackerError, metrics,
};
use crate::ports::{Clock, CompletionHook, StatusClient};

/// Why a Poller chain ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollExit {
    /// The job reached a terminal status.
    Terminal,
    /// A failed fetch ended the chain (per failure policy).
    Halted { reason: String },
    /// `stop_tracking` / shutdown.
    Cancelled,
    /// Another chain owns the job, or it was already terminal.
    Superseded,
    /// The store could not persist an update.
    StoreFailed { reason: String },
}

/// Everything a Poller needs; shared by every chain of one tracker.
pub(crate) struct PollerContext<S: JobStatus> {
    pub(crate) store: Arc<TaskRecordStore<S>>,
    pub(crate) client: Arc<dyn StatusClient<S>>,
    pub(crate) hook: Arc<dyn CompletionHook<S>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: TrackerConfig,
}

/// Handle of one running chain.
/// - `cancel()` か handle の drop でチェーンが止まる
/// - `join()` で終了理由を受け取れる
pub struct PollHandle {
    job_id: JobId,
    token: PollerToken,
    cancel_tx: watch::Sender<bool>,
    join: JoinHandle<PollExit>,
}

impl PollHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn token(&self) -> PollerToken {
        self.token
    }

    /// Request the chain to stop. An in-flight fetch is abandoned; an
    /// in-flight store update completes first.
    pub fn cancel(&self) {
        // ignore send error: the chain may already be gone
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the chain to end.
    pub async fn join(self) -> Option<PollExit> {
        self.join.await.ok()
    }
}

/// Start a chain for `job_id`; `token` must have been claimed from the store.
pub(crate) fn spawn<S: JobStatus>(
    ctx: Arc<PollerContext<S>>,
    job_id: JobId,
    token: PollerToken,
) -> PollHandle {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let task_job = job_id.clone();
    let join = tokio::spawn(async move { run(ctx, task_job, token, cancel_rx).await });
    PollHandle {
        job_id,
        token,
        cancel_tx,
        join,
    }
}

enum Cycle {
    Continue,
    Terminal,
    Stale,
    Cancelled,
    Failed(FetchError),
    StoreFailed(TrackerError),
}

async fn run<S: JobStatus>(
    ctx: Arc<PollerContext<S>>,
    job_id: JobId,
    token: PollerToken,
    mut cancel_rx: watch::Receiver<bool>,
) -> PollExit {
    tracing::debug!(tracker = S::TRACKER, job_id = %job_id, token = %token, "poller started");
    let mut failures: u32 = 0;

    loop {
        if *cancel_rx.borrow() {
            return ctx.finish(&job_id, token, PollExit::Cancelled).await;
        }

        let delay = match ctx.cycle(&job_id, token, &mut cancel_rx).await {
            Cycle::Continue => {
                failures = 0;
                ctx.config.poll_interval
            }
            Cycle::Terminal => return PollExit::Terminal,
            Cycle::Stale => {
                tracing::debug!(tracker = S::TRACKER, job_id = %job_id, "poller superseded");
                return PollExit::Superseded;
            }
            Cycle::Cancelled => return ctx.finish(&job_id, token, PollExit::Cancelled).await,
            Cycle::StoreFailed(err) => {
                let exit = PollExit::StoreFailed {
                    reason: err.to_string(),
                };
                return ctx.finish(&job_id, token, exit).await;
            }
            Cycle::Failed(err) => {
                failures += 1;
                tracing::warn!(
                    tracker = S::TRACKER,
                    job_id = %job_id,
                    error = %err,
                    failures,
                    "status fetch failed"
                );
                match ctx.config.failure_policy.decide(failures) {
                    FailureDecision::Retry { delay } => delay,
                    FailureDecision::Halt { reason } => {
                        tracing::warn!(
                            tracker = S::TRACKER,
                            job_id = %job_id,
                            %reason,
                            "polling halted"
                        );
                        let exit = PollExit::Halted {
                            reason: err.to_string(),
                        };
                        return ctx.finish(&job_id, token, exit).await;
                    }
                }
            }
        };

        tokio::select! {
            biased;
            _ = wait_cancelled(&mut cancel_rx) => {
                return ctx.finish(&job_id, token, PollExit::Cancelled).await;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

impl<S: JobStatus> PollerContext<S> {
    async fn cycle(
        &self,
        job_id: &JobId,
        token: PollerToken,
        cancel_rx: &mut watch::Receiver<bool>,
    ) -> Cycle {
        // 古いタイマーからの呼び出しはここで弾く
        let Some(record) = self.store.get(job_id).await else {
            return Cycle::Stale;
        };
        if record.active_poller != Some(token) || record.is_terminal() {
            return Cycle::Stale;
        }

        let fetched = tokio::select! {
            biased;
            _ = wait_cancelled(cancel_rx) => return Cycle::Cancelled,
            fetched = self.fetch(job_id) => fetched,
        };
        let (snapshot, metrics_snapshot) = match fetched {
            Ok(v) => v,
            Err(err) => return Cycle::Failed(err),
        };

        let expected = snapshot
            .expected_duration_seconds
            .or(record.expected_duration_seconds);
        let derived = metrics::derive(
            record.start_time,
            self.clock.now(),
            expected,
            metrics_snapshot.as_ref(),
            &record.metric_trend,
        );
        let patch = TaskPatch {
            status: Some(snapshot.status),
            elapsed_minutes: Some(derived.elapsed_minutes),
            progress_percent: Some(derived.progress_percent),
            latest_metrics: derived.latest_metrics,
            expected_duration_seconds: snapshot.expected_duration_seconds,
            append_trend: derived.appended.into_iter().collect(),
            last_error: Some(None),
        };

        let applied = match self.store.apply_poll(job_id, token, patch).await {
            Ok(Some(applied)) => applied,
            Ok(None) => return Cycle::Stale,
            Err(err) => return Cycle::StoreFailed(err),
        };

        if applied.record.status != record.status {
            tracing::info!(
                tracker = S::TRACKER,
                job_id = %job_id,
                from = %record.status,
                to = %applied.record.status,
                progress = applied.record.progress_percent,
                "job status changed"
            );
        }

        if applied.fire_completion {
            // 一度きり: 失敗してもリトライしない（completion_fired は既に true）
            if let Err(err) = self.hook.on_terminal_success(&applied.record).await {
                tracing::error!(
                    tracker = S::TRACKER,
                    job_id = %job_id,
                    error = %err,
                    "completion hook failed"
                );
            }
        }

        if applied.record.is_terminal() {
            tracing::info!(
                tracker = S::TRACKER,
                job_id = %job_id,
                status = %applied.record.status,
                "job reached terminal status"
            );
            Cycle::Terminal
        } else {
            Cycle::Continue
        }
    }

    async fn fetch(
        &self,
        job_id: &JobId,
    ) -> Result<(StatusSnapshot<S>, Option<MetricsSnapshot>), FetchError> {
        let snapshot = self.bounded(self.client.fetch_status(job_id)).await?;
        if !snapshot.status.collects_metrics() {
            return Ok((snapshot, None));
        }

        // メトリクスの取得失敗では状態の反映を止めない
        match self.bounded(self.client.fetch_metrics(job_id)).await {
            Ok(m) => Ok((snapshot, Some(m))),
            Err(err) => {
                tracing::warn!(
                    tracker = S::TRACKER,
                    job_id = %job_id,
                    error = %err,
                    "metrics fetch failed, applying status only"
                );
                Ok((snapshot, None))
            }
        }
    }

    async fn bounded<T>(
        &self,
        request: impl Future<Output = Result<T, FetchError>>,
    ) -> Result<T, FetchError> {
        match self.config.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or(Err(FetchError::TimedOut(limit))),
            None => request.await,
        }
    }

    /// Detach `token` from the job and report `exit`.
    async fn finish(&self, job_id: &JobId, token: PollerToken, exit: PollExit) -> PollExit {
        let reason = match &exit {
            PollExit::Halted { reason } | PollExit::StoreFailed { reason } => Some(reason.clone()),
            _ => None,
        };
        if let Err(err) = self.store.release_poller(job_id, token, reason).await {
            tracing::error!(
                tracker = S::TRACKER,
                job_id = %job_id,
                error = %err,
                "failed to release poller"
            );
        }
        tracing::debug!(tracker = S::TRACKER, job_id = %job_id, exit = ?exit, "poller stopped");
        exit
    }
}

/// Resolves once cancellation is requested or the handle is dropped.
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
