//! Domain identifiers (strongly-typed keys).
//!
//! # 文字列キー + Phantom Type
//! ジョブ ID や相関 ID はサーバー側が発行する文字列なので、そのまま保持します。
//! `Key<T>` というジェネリック型で共通実装を提供し、`T` はマーカー型として
//! コンパイル時の型安全性だけを提供します（JobId と CorrelationId は混同できない）。
//!
//! Poller の識別子だけはこのプロセス内で発行するので、ULID ベースの
//! `PollerToken` を使います。

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

use super::errors::TrackerError;

/// KeyMarker は各キー型のマーカー trait
pub trait KeyMarker: Send + Sync + 'static {
    /// エラーメッセージやログで使うラベル（例: "job_id"）
    fn label() -> &'static str;
}

/// ジェネリックな文字列キー
///
/// 空文字列・空白のみのキーは `parse` で拒否されます（デシリアライズ時も同じ）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Key<T: KeyMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: KeyMarker> Key<T> {
    /// 文字列からキーを作成（前後の空白は取り除く）
    pub fn parse(value: impl AsRef<str>) -> Result<Self, TrackerError> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TrackerError::InvalidKey { label: T::label() });
        }
        Ok(Self {
            value: trimmed.to_string(),
            _marker: PhantomData,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<'de, T: KeyMarker> Deserialize<'de> for Key<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

impl<T: KeyMarker> fmt::Display for Key<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: KeyMarker> AsRef<str> for Key<T> {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Job のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl KeyMarker for Job {
    fn label() -> &'static str {
        "job_id"
    }
}

/// Correlation のマーカー型（学習・デプロイ対象のモデルなど）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Correlation {}

impl KeyMarker for Correlation {
    fn label() -> &'static str {
        "correlation_id"
    }
}

/// Identifier of a tracked remote job (experiment id, deployment id, ...).
pub type JobId = Key<Job>;

/// Identifier of the resource a job works on (e.g. the model it trains).
pub type CorrelationId = Key<Correlation>;

/// Identifier of one live Poller chain.
///
/// Persisted inside the record so that a second chain for the same job can
/// be refused. Time-sortable like every ULID.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollerToken(Ulid);

impl PollerToken {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for PollerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "poller-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_trimmed() {
        let job = JobId::parse("  exp-1 ").unwrap();
        assert_eq!(job.as_str(), "exp-1");
        assert_eq!(job.to_string(), "exp-1");
    }

    #[test]
    fn blank_keys_are_rejected() {
        let err = JobId::parse("   ").unwrap_err();
        assert!(err.to_string().contains("job_id"));

        let err = CorrelationId::parse("").unwrap_err();
        assert!(err.to_string().contains("correlation_id"));
    }

    #[test]
    fn keys_serialize_as_plain_strings() {
        let job = JobId::parse("exp-1").unwrap();
        let json = serde_json::to_string(&job).unwrap();
        assert_eq!(json, "\"exp-1\"");

        let back: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn blank_keys_are_rejected_when_deserializing() {
        let err = serde_json::from_str::<JobId>("\"  \"").unwrap_err();
        assert!(err.to_string().contains("job_id"));

        let map = serde_json::from_str::<std::collections::BTreeMap<JobId, u32>>(r#"{"": 1}"#);
        assert!(map.is_err());

        let trimmed: CorrelationId = serde_json::from_str("\" model-7 \"").unwrap();
        assert_eq!(trimmed.as_str(), "model-7");
    }

    #[test]
    fn phantom_marker_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<JobId>(), size_of::<String>());
        assert_eq!(size_of::<PollerToken>(), size_of::<Ulid>());
    }

    #[test]
    fn poller_token_display_has_prefix() {
        let token = PollerToken::from_ulid(Ulid::new());
        assert!(token.to_string().starts_with("poller-"));
    }
}
