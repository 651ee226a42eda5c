//! RecordStorage port - 永続化先（ファイル、メモリなど）
//!
//! Tracker インスタンスごとに 1 つのキーを持ち、`job_id -> TaskRecord` の
//! マップ全体を JSON として保存します。スキーマのバージョニングはありません。

use async_trait::async_trait;

use crate::domain::TrackerError;

/// RecordStorage は durable な key/value ストア
///
/// # 設計原則
/// - `save` は値全体を置き換える（部分更新なし）
/// - `save` が返った時点で永続化済み
#[async_trait]
pub trait RecordStorage: Send + Sync {
    /// Stored value for `key`, or `None` when nothing was saved yet.
    async fn load(&self, key: &str) -> Result<Option<String>, TrackerError>;

    async fn save(&self, key: &str, value: &str) -> Result<(), TrackerError>;
}
