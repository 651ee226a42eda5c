//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてトラッカーを実装します。
//!
//! # 主要コンポーネント
//! - **TrackerBuilder**: トラッカーの構築とワイヤリング
//! - **Tracker**: seed / restore / subscribe の公開面
//! - **TaskRecordStore**: 永続化され、購読できるレコードマップ
//! - **Poller**: ジョブごとの観測ループ
//! - **RestorationGuard**: 再起動時の復元を 1 回に制限

pub mod builder;
pub mod config;
pub mod poller;
pub mod policy;
pub mod restore;
pub mod store;
pub mod tracker;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, TrackerBuilder};
pub use self::config::TrackerConfig;
pub use self::poller::{PollExit, PollHandle};
pub use self::policy::{FailureDecision, FailurePolicy, RetryPolicy};
pub use self::restore::{RestorationGuard, RestoreReport};
pub use self::store::{PollApplied, Seeded, TaskRecordStore};
pub use self::tracker::Tracker;

use crate::domain::{DeploymentStatus, TrainingStatus};

/// Tracker for training experiments.
pub type TrainingTracker = Tracker<TrainingStatus>;

/// Tracker for model deployments.
pub type DeploymentTracker = Tracker<DeploymentStatus>;
