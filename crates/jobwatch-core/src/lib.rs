//! jobwatch-core
//!
//! Persistent tracking of long-running remote jobs (training runs, model
//! deployments) that expose their progress only through polling.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status, record, snapshot, metrics, errors）
//! - **ports**: 抽象化レイヤー（StatusClient, RecordStorage, CompletionHook, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, tracker, store, poller, policy, restore）
//! - **impls**: 実装（HTTP クライアント, JSON ファイル永続化, フック）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::app::{
    BuildError, DeploymentTracker, FailurePolicy, RestoreReport, RetryPolicy, Tracker,
    TrackerBuilder, TrackerConfig, TrainingTracker,
};
pub use crate::domain::{
    CorrelationId, DeploymentStatus, JobId, JobStatus, TaskRecord, TrackerError, TrainingStatus,
};
