//! IdGenerator port - Poller トークン生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::PollerToken;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は Poller チェーンごとのトークンを生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数の Poller タスクから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_poller_token(&self) -> PollerToken;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// テスト時に ManualClock を使っても、ランダム部分があるので一意になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_poller_token(&self) -> PollerToken {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        PollerToken::from_ulid(ulid)
    }
}
