//! Tracker - seed / restore / subscribe の公開面
//!
//! # 責務
//! - seed_task(): レコードを用意し、Poller がいなければ 1 本だけ付ける
//! - restore_all(): 永続化済みの未終端レコードに Poller を付け直す（インスタンスごとに 1 回）
//! - subscribe(): UI 向けの読み取り経路
//!
//! Poller チェーンの排他は TaskRecordStore のトークンで保証されるので、
//! seed と restore が競合しても同じジョブに 2 本付くことはありません。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use super::config::TrackerConfig;
use super::poller::{self, PollExit, PollHandle, PollerContext};
use super::restore::{RestorationGuard, RestoreReport};
use super::store::TaskRecordStore;
use crate::domain::{CorrelationId, JobId, JobStatus, TaskRecord, TrackerError};

/// Generic persistent job tracker, one per status vocabulary.
pub struct Tracker<S: JobStatus> {
    ctx: Arc<PollerContext<S>>,
    guard: RestorationGuard,
    pollers: Mutex<HashMap<JobId, PollHandle>>,
}

impl<S: JobStatus> Tracker<S> {
    pub(crate) fn new(ctx: PollerContext<S>) -> Self {
        Self {
            ctx: Arc::new(ctx),
            guard: RestorationGuard::new(),
            pollers: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &TaskRecordStore<S> {
        &self.ctx.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.ctx.config
    }

    /// Begin (or keep) tracking `job_id`.
    ///
    /// Idempotent: an existing record keeps its start time and trend, and no
    /// second Poller is attached while one is live. A halted job gets a new chain.
    pub async fn seed_task(
        &self,
        job_id: &JobId,
        correlation_id: &CorrelationId,
    ) -> Result<TaskRecord<S>, TrackerError> {
        let seeded = self.ctx.store.seed(job_id, correlation_id).await?;
        if seeded.created {
            tracing::info!(
                tracker = S::TRACKER,
                job_id = %job_id,
                correlation_id = %correlation_id,
                "tracking new job"
            );
        }
        self.attach(job_id).await?;
        Ok(self.ctx.store.get(job_id).await.unwrap_or(seeded.record))
    }

    /// Resume polling for every persisted non-terminal job.
    ///
    /// Only the first call per instance does anything.
    pub async fn restore_all(&self) -> RestoreReport {
        if !self.guard.try_begin() {
            tracing::debug!(tracker = S::TRACKER, "restoration already ran");
            return RestoreReport::skipped();
        }

        let mut report = RestoreReport::default();
        for (job_id, record) in self.ctx.store.all().await {
            if record.is_terminal() {
                report.terminal += 1;
                continue;
            }
            match self.attach(&job_id).await {
                Ok(true) => report.attached += 1,
                Ok(false) => report.already_polling += 1,
                Err(err) => {
                    tracing::warn!(
                        tracker = S::TRACKER,
                        job_id = %job_id,
                        error = %err,
                        "failed to restore poller"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            tracker = S::TRACKER,
            attached = report.attached,
            already_polling = report.already_polling,
            terminal = report.terminal,
            failed = report.failed,
            "restored task records"
        );
        report
    }

    pub async fn subscribe(&self, job_id: &JobId) -> watch::Receiver<Option<TaskRecord<S>>> {
        self.ctx.store.subscribe(job_id).await
    }

    pub async fn get(&self, job_id: &JobId) -> Option<TaskRecord<S>> {
        self.ctx.store.get(job_id).await
    }

    pub async fn all(&self) -> BTreeMap<JobId, TaskRecord<S>> {
        self.ctx.store.all().await
    }

    /// Cancel the chain of `job_id` and wait for it to end.
    ///
    /// Returns `None` when no chain was attached by this instance.
    pub async fn stop_tracking(&self, job_id: &JobId) -> Option<PollExit> {
        let handle = self.lock_pollers().remove(job_id)?;
        handle.cancel();
        let exit = handle.join().await;
        tracing::info!(tracker = S::TRACKER, job_id = %job_id, exit = ?exit, "stopped tracking");
        exit
    }

    /// Jobs with a running chain.
    pub fn active_jobs(&self) -> Vec<JobId> {
        let mut pollers = self.lock_pollers();
        pollers.retain(|_, handle| !handle.is_finished());
        pollers.keys().cloned().collect()
    }

    /// Cancel every chain and wait for all of them.
    pub async fn shutdown(&self) {
        let handles: Vec<PollHandle> = self.lock_pollers().drain().map(|(_, h)| h).collect();
        for handle in &handles {
            handle.cancel();
        }
        let count = handles.len();
        for handle in handles {
            handle.join().await;
        }
        tracing::info!(tracker = S::TRACKER, pollers = count, "tracker shut down");
    }

    async fn attach(&self, job_id: &JobId) -> Result<bool, TrackerError> {
        let Some(token) = self.ctx.store.claim_poller(job_id).await? else {
            return Ok(false);
        };
        let handle = poller::spawn(self.ctx.clone(), job_id.clone(), token);
        let mut pollers = self.lock_pollers();
        pollers.retain(|_, handle| !handle.is_finished());
        // 置き換えられるのは既に終わったチェーンだけ
        pollers.insert(job_id.clone(), handle);
        Ok(true)
    }

    fn lock_pollers(&self) -> MutexGuard<'_, HashMap<JobId, PollHandle>> {
        self.pollers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
