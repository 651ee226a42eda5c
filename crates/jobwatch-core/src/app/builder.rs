//! TrackerBuilder - トラッカーの構築とワイヤリング
//!
//! # 方針
//! - 必須の依存（RecordStorage, StatusClient）が欠けていれば build() で失敗（Fail-fast）
//! - Clock / CompletionHook / 設定 / 永続化キーにはデフォルトがある

use std::sync::Arc;

use super::config::TrackerConfig;
use super::poller::PollerContext;
use super::store::TaskRecordStore;
use super::tracker::Tracker;
use crate::domain::{JobStatus, TrackerError};
use crate::impls::NoopHook;
use crate::ports::{Clock, CompletionHook, RecordStorage, StatusClient, SystemClock, UlidGenerator};

/// Builds a [`Tracker`].
///
/// # 使用例
/// ```ignore
/// let tracker = TrackerBuilder::<TrainingStatus>::new()
///     .storage(Arc::new(JsonFileStorage::new("./state")))
///     .status_client(Arc::new(client))
///     .completion_hook(Arc::new(registrar))
///     .build()
///     .await?;
/// ```
pub struct TrackerBuilder<S: JobStatus> {
    storage: Option<Arc<dyn RecordStorage>>,
    client: Option<Arc<dyn StatusClient<S>>>,
    hook: Arc<dyn CompletionHook<S>>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    storage_key: Option<String>,
}

/// BuildError はトラッカー構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no record storage configured")]
    MissingStorage,

    #[error("no status client configured")]
    MissingStatusClient,

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("failed to open task store: {0}")]
    Store(#[from] TrackerError),
}

impl<S: JobStatus> TrackerBuilder<S> {
    pub fn new() -> Self {
        Self {
            storage: None,
            client: None,
            hook: Arc::new(NoopHook),
            clock: Arc::new(SystemClock),
            config: TrackerConfig::default(),
            storage_key: None,
        }
    }

    pub fn storage(mut self, storage: Arc<dyn RecordStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn status_client(mut self, client: Arc<dyn StatusClient<S>>) -> Self {
        self.client = Some(client);
        self
    }

    /// Called once per job on terminal success. Defaults to a no-op.
    pub fn completion_hook(mut self, hook: Arc<dyn CompletionHook<S>>) -> Self {
        self.hook = hook;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage key of the record map. Defaults to `{tracker}_tasks`.
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = Some(key.into());
        self
    }

    /// Validate, open the store and return the tracker. No Poller is started.
    pub async fn build(self) -> Result<Tracker<S>, BuildError> {
        let storage = self.storage.ok_or(BuildError::MissingStorage)?;
        let client = self.client.ok_or(BuildError::MissingStatusClient)?;
        if self.config.poll_interval.is_zero() {
            return Err(BuildError::ZeroPollInterval);
        }

        let key = self
            .storage_key
            .unwrap_or_else(|| format!("{}_tasks", S::TRACKER));
        let ids = Arc::new(UlidGenerator::new(self.clock.clone()));
        let store = TaskRecordStore::open(key, storage, self.clock.clone(), ids).await?;

        Ok(Tracker::new(PollerContext {
            store: Arc::new(store),
            client,
            hook: self.hook,
            clock: self.clock,
            config: self.config,
        }))
    }
}

impl<S: JobStatus> Default for TrackerBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeploymentStatus, TrainingStatus};
    use crate::impls::InMemoryStorage;
    use crate::testing::ScriptedClient;
    use std::time::Duration;

    #[tokio::test]
    async fn test_build_success_uses_default_key() {
        let tracker = TrackerBuilder::<TrainingStatus>::new()
            .storage(Arc::new(InMemoryStorage::new()))
            .status_client(Arc::new(ScriptedClient::<TrainingStatus>::new()))
            .build()
            .await
            .unwrap();

        assert_eq!(tracker.store().key(), "training_tasks");
        assert!(tracker.active_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_build_custom_key() {
        let tracker = TrackerBuilder::<DeploymentStatus>::new()
            .storage(Arc::new(InMemoryStorage::new()))
            .status_client(Arc::new(ScriptedClient::<DeploymentStatus>::new()))
            .storage_key("prod_deployments")
            .build()
            .await
            .unwrap();

        assert_eq!(tracker.store().key(), "prod_deployments");
    }

    #[tokio::test]
    async fn test_build_missing_storage() {
        let result = TrackerBuilder::<TrainingStatus>::new()
            .status_client(Arc::new(ScriptedClient::<TrainingStatus>::new()))
            .build()
            .await;
        assert!(matches!(result, Err(BuildError::MissingStorage)));
    }

    #[tokio::test]
    async fn test_build_missing_status_client() {
        let result = TrackerBuilder::<TrainingStatus>::new()
            .storage(Arc::new(InMemoryStorage::new()))
            .build()
            .await;
        assert!(matches!(result, Err(BuildError::MissingStatusClient)));
    }

    #[tokio::test]
    async fn test_build_rejects_zero_interval() {
        let result = TrackerBuilder::<TrainingStatus>::new()
            .storage(Arc::new(InMemoryStorage::new()))
            .status_client(Arc::new(ScriptedClient::<TrainingStatus>::new()))
            .config(TrackerConfig {
                poll_interval: Duration::ZERO,
                ..TrackerConfig::default()
            })
            .build()
            .await;
        assert!(matches!(result, Err(BuildError::ZeroPollInterval)));
    }

    #[tokio::test]
    async fn test_build_fails_on_corrupt_storage() {
        let storage = Arc::new(InMemoryStorage::new());
        storage.insert("training_tasks", "{not json").await;

        let result = TrackerBuilder::<TrainingStatus>::new()
            .storage(storage)
            .status_client(Arc::new(ScriptedClient::<TrainingStatus>::new()))
            .build()
            .await;
        assert!(matches!(result, Err(BuildError::Store(_))));
    }
}
