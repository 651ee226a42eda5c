//! CompletionHook port - 成功終端での一度きりの副作用
//!
//! 例: 学習ジョブが DONE になったら派生モデルを登録する。

use async_trait::async_trait;

use crate::domain::{JobStatus, TaskRecord, TrackerError};

/// CompletionHook はジョブが成功終端に達したときに一度だけ呼ばれる
///
/// Tracker 側は「一度だけ呼ぶ」ことを保証します。呼び出し先でリトライする場合の
/// 冪等性は実装側の責任です。
#[async_trait]
pub trait CompletionHook<S: JobStatus>: Send + Sync {
    async fn on_terminal_success(&self, record: &TaskRecord<S>) -> Result<(), TrackerError>;
}
