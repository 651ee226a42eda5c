//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **HttpStatusClient**: REST バックエンド向けの StatusClient
//! - **JsonFileStorage**: キーごとに JSON ファイルへ永続化
//! - **InMemoryStorage**: テスト・一時実行用
//! - **HttpModelRegistrar / LoggingHook / NoopHook**: 成功終端フック

pub mod file_storage;
pub mod hooks;
pub mod http_client;
pub mod memory_storage;

pub use self::file_storage::JsonFileStorage;
pub use self::hooks::{HttpModelRegistrar, LoggingHook, NoopHook};
pub use self::http_client::{HttpStatusClient, Routes};
pub use self::memory_storage::InMemoryStorage;
