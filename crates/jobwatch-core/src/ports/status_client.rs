//! StatusClient port - リモートのジョブ状態サービス
//!
//! 入出力の契約だけを定義します。HTTP 実装は `impls::http_client` にあります。

use async_trait::async_trait;

use crate::domain::{FetchError, JobId, JobStatus, MetricsSnapshot, StatusSnapshot};

/// StatusClient はジョブの現在の状態とメトリクスを取得
///
/// # 契約
/// - 成功（HTTP 200 かつ解釈可能な body）のみ `Ok`
/// - 422/500 などは `FetchError::SoftFailure`
/// - ネットワーク障害は `FetchError::Transport`
#[async_trait]
pub trait StatusClient<S: JobStatus>: Send + Sync {
    async fn fetch_status(&self, job_id: &JobId) -> Result<StatusSnapshot<S>, FetchError>;

    /// Called only while the job is in a metrics-bearing phase.
    async fn fetch_metrics(&self, job_id: &JobId) -> Result<MetricsSnapshot, FetchError>;
}
