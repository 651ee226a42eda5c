//! TaskRecordStore - job_id -> TaskRecord の正本
//!
//! # 設計原則
//! - すべての変更はロック内で「マージ → 永続化 → 通知」の順に行う
//! - 永続化に失敗した変更はメモリにも残さない（`commit()`）
//! - 永続化は毎回マップ全体（クラッシュしても失うのは処理中のポーリング 1 回分だけ）
//! - Poller トークンの check-and-set もここで行い、同じジョブに 2 本のチェーンが
//!   付かないようにする
//! - UI の読み取り経路は `subscribe()` の watch チャネルのみ

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use crate::domain::{
    CorrelationId, JobId, JobStatus, PollerToken, TaskPatch, TaskRecord, TrackerError,
};
use crate::ports::{Clock, IdGenerator, RecordStorage};

/// Result of merging one poll into the store.
#[derive(Debug, Clone)]
pub struct PollApplied<S> {
    pub record: TaskRecord<S>,
    /// True exactly once per job: the first time it reaches terminal success.
    pub fire_completion: bool,
}

/// Seed result.
#[derive(Debug, Clone)]
pub struct Seeded<S> {
    pub record: TaskRecord<S>,
    /// False when the job was already tracked (nothing was reset).
    pub created: bool,
}

struct StoreState<S> {
    records: BTreeMap<JobId, TaskRecord<S>>,
    /// Tokens issued by this process. Persisted tokens not in this set are stale.
    live_pollers: HashSet<PollerToken>,
    watchers: HashMap<JobId, watch::Sender<Option<TaskRecord<S>>>>,
}

impl<S: JobStatus> StoreState<S> {
    fn publish(&self, job_id: &JobId) {
        if let Some(tx) = self.watchers.get(job_id) {
            tx.send_replace(self.records.get(job_id).cloned());
        }
    }

    fn has_live_poller(&self, record: &TaskRecord<S>) -> bool {
        record
            .active_poller
            .is_some_and(|token| self.live_pollers.contains(&token))
    }
}

/// Persisted, observable map of task records for one tracker instance.
pub struct TaskRecordStore<S: JobStatus> {
    key: String,
    storage: Arc<dyn RecordStorage>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    state: Mutex<StoreState<S>>,
}

impl<S: JobStatus> TaskRecordStore<S> {
    /// Open the store and load every record saved under `key`.
    pub async fn open(
        key: impl Into<String>,
        storage: Arc<dyn RecordStorage>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, TrackerError> {
        let key = key.into();
        let records = load_records(storage.as_ref(), &key).await?;
        tracing::debug!(tracker = S::TRACKER, key = %key, records = records.len(), "task store opened");
        Ok(Self {
            key,
            storage,
            clock,
            ids,
            state: Mutex::new(StoreState {
                records,
                live_pollers: HashSet::new(),
                watchers: HashMap::new(),
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Replace the in-memory map with what is in durable storage.
    pub async fn reload(&self) -> Result<usize, TrackerError> {
        let records = load_records(self.storage.as_ref(), &self.key).await?;
        let mut state = self.state.lock().await;
        state.records = records;
        let watched: Vec<JobId> = state.watchers.keys().cloned().collect();
        for job_id in &watched {
            state.publish(job_id);
        }
        Ok(state.records.len())
    }

    pub async fn get(&self, job_id: &JobId) -> Option<TaskRecord<S>> {
        let state = self.state.lock().await;
        state.records.get(job_id).cloned()
    }

    /// Every record, ordered by job id.
    pub async fn all(&self) -> BTreeMap<JobId, TaskRecord<S>> {
        let state = self.state.lock().await;
        state.records.clone()
    }

    /// Create the record if missing. An existing record is returned untouched.
    pub async fn seed(
        &self,
        job_id: &JobId,
        correlation_id: &CorrelationId,
    ) -> Result<Seeded<S>, TrackerError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.records.get(job_id) {
            return Ok(Seeded {
                record: existing.clone(),
                created: false,
            });
        }

        let record = TaskRecord::new(job_id.clone(), correlation_id.clone(), self.clock.now());
        self.commit(&mut state, record.clone()).await?;
        Ok(Seeded {
            record,
            created: true,
        })
    }

    /// Merge `patch` into the record for `job_id`, seeding it first if needed.
    ///
    /// Terminal records are returned unchanged.
    pub async fn upsert(
        &self,
        job_id: &JobId,
        correlation_id: &CorrelationId,
        patch: TaskPatch<S>,
    ) -> Result<TaskRecord<S>, TrackerError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let mut record = match state.records.get(job_id) {
            Some(existing) if existing.is_terminal() => return Ok(existing.clone()),
            Some(existing) => existing.clone(),
            None => TaskRecord::new(job_id.clone(), correlation_id.clone(), now),
        };
        record.apply(patch, now);
        self.commit(&mut state, record.clone()).await?;
        Ok(record)
    }

    /// Atomically attach a new Poller chain to `job_id`.
    ///
    /// Returns `None` when the job is terminal or a chain of this process is
    /// already attached.
    pub async fn claim_poller(&self, job_id: &JobId) -> Result<Option<PollerToken>, TrackerError> {
        let mut state = self.state.lock().await;
        let Some(record) = state.records.get(job_id) else {
            return Err(TrackerError::UnknownJob(job_id.to_string()));
        };
        if record.is_terminal() || state.has_live_poller(record) {
            return Ok(None);
        }

        let token = self.ids.generate_poller_token();
        let mut claimed = record.clone();
        claimed.active_poller = Some(token);
        self.commit(&mut state, claimed).await?;
        state.live_pollers.insert(token);
        Ok(Some(token))
    }

    /// Detach the chain identified by `token`, optionally recording why it stopped.
    pub async fn release_poller(
        &self,
        job_id: &JobId,
        token: PollerToken,
        reason: Option<String>,
    ) -> Result<(), TrackerError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        // 永続化に失敗しても token は死んでいるので、次の claim は通る
        state.live_pollers.remove(&token);
        let Some(record) = state.records.get(job_id) else {
            return Ok(());
        };
        if record.active_poller != Some(token) {
            return Ok(());
        }
        let mut released = record.clone();
        released.active_poller = None;
        if reason.is_some() {
            released.last_error = reason;
        }
        released.updated_at = now;
        self.commit(&mut state, released).await
    }

    /// Whether `token` still owns `job_id` and the job is not terminal.
    pub async fn is_current(&self, job_id: &JobId, token: PollerToken) -> bool {
        let state = self.state.lock().await;
        state
            .records
            .get(job_id)
            .is_some_and(|r| r.active_poller == Some(token) && !r.is_terminal())
    }

    /// Merge one poll result on behalf of the chain holding `token`.
    ///
    /// Returns `None` without touching anything when the chain is stale or the
    /// record is already terminal. Reaching a terminal status detaches the chain.
    pub async fn apply_poll(
        &self,
        job_id: &JobId,
        token: PollerToken,
        patch: TaskPatch<S>,
    ) -> Result<Option<PollApplied<S>>, TrackerError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let Some(current) = state.records.get(job_id) else {
            return Err(TrackerError::UnknownJob(job_id.to_string()));
        };
        if current.active_poller != Some(token) || current.is_terminal() {
            return Ok(None);
        }

        let mut record = current.clone();
        let reported = patch.status;
        let previous = record.status;
        record.apply(patch, now);
        if let Some(reported) = reported
            && record.status != reported
        {
            tracing::warn!(
                tracker = S::TRACKER,
                job_id = %job_id,
                current = %previous,
                reported = %reported,
                "ignoring status regression"
            );
        }

        let mut fire_completion = false;
        if record.is_terminal() {
            record.active_poller = None;
            if record.status.is_success() && !record.completion_fired {
                record.completion_fired = true;
                fire_completion = true;
            }
        }
        // 保存に失敗したらメモリ上も元のまま（completion_fired も立たない）
        self.commit(&mut state, record.clone()).await?;
        if record.is_terminal() {
            state.live_pollers.remove(&token);
        }
        Ok(Some(PollApplied {
            record,
            fire_completion,
        }))
    }

    /// Watch one job. The receiver holds `None` until the job is seeded.
    pub async fn subscribe(&self, job_id: &JobId) -> watch::Receiver<Option<TaskRecord<S>>> {
        let mut state = self.state.lock().await;
        if let Some(tx) = state.watchers.get(job_id) {
            return tx.subscribe();
        }
        let (tx, rx) = watch::channel(state.records.get(job_id).cloned());
        state.watchers.insert(job_id.clone(), tx);
        rx
    }

    /// Persist the map with `record` in place, then publish it.
    ///
    /// On a failed save the previous record is put back, so memory never holds
    /// a change that is not on disk.
    async fn commit(
        &self,
        state: &mut StoreState<S>,
        record: TaskRecord<S>,
    ) -> Result<(), TrackerError> {
        let job_id = record.job_id.clone();
        let previous = state.records.insert(job_id.clone(), record);
        if let Err(err) = self.persist(state).await {
            match previous {
                Some(previous) => state.records.insert(job_id, previous),
                None => state.records.remove(&job_id),
            };
            return Err(err);
        }
        state.publish(&job_id);
        Ok(())
    }

    async fn persist(&self, state: &StoreState<S>) -> Result<(), TrackerError> {
        let json = serde_json::to_string(&state.records)?;
        self.storage.save(&self.key, &json).await.inspect_err(|err| {
            tracing::error!(tracker = S::TRACKER, key = %self.key, error = %err, "failed to persist task records");
        })
    }
}

async fn load_records<S: JobStatus>(
    storage: &dyn RecordStorage,
    key: &str,
) -> Result<BTreeMap<JobId, TaskRecord<S>>, TrackerError> {
    match storage.load(key).await? {
        Some(json) if !json.trim().is_empty() => Ok(serde_json::from_str(&json)?),
        _ => Ok(BTreeMap::new()),
    }
}
