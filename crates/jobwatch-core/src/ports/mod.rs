//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（状態 API, 永続化先, 時計）へのインターフェースを
//! 提供し、実装の詳細を隠蔽します。

pub mod clock;
pub mod completion_hook;
pub mod id_generator;
pub mod record_storage;
pub mod status_client;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::completion_hook::CompletionHook;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::record_storage::RecordStorage;
pub use self::status_client::StatusClient;
