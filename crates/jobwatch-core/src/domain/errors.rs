//! Errors - エラー型と分類
//!
//! ポーリング中の失敗はジョブごとの Poller に閉じ込められ、他のジョブや
//! ストアには波及しません。ここではその分類と、ストア・構築時のエラーを定義します。

use std::time::Duration;

use thiserror::Error;

/// ErrorKind は失敗の運用分類
///
/// - SoftFailure: サーバーが 422/500 などを返した（未準備・不正な状態）
/// - Transport: ネットワーク障害、タイムアウト
/// - Storage: 永続化層の障害
/// - Invalid: 呼び出し側の入力が不正
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SoftFailure,
    Transport,
    Storage,
    Invalid,
}

/// Failure reported by a [`StatusClient`](crate::ports::StatusClient).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The server answered, but not with a usable status (422, 500, ...).
    #[error("server returned soft failure (http {http_status})")]
    SoftFailure { http_status: u16 },

    /// The server answered 200 with a body we could not understand.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Network error, connection refused, TLS, ...
    #[error("transport error: {0}")]
    Transport(String),

    /// No answer within the configured fetch timeout.
    #[error("request timed out after {0:?}")]
    TimedOut(Duration),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::SoftFailure { .. } | FetchError::Malformed(_) => ErrorKind::SoftFailure,
            FetchError::Transport(_) | FetchError::TimedOut(_) => ErrorKind::Transport,
        }
    }
}

/// TrackerError はライブラリ全体のエラー
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{label} must not be empty")]
    InvalidKey { label: &'static str },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no task record for job_id={0}")]
    UnknownJob(String),

    #[error("storage key '{key}' could not be read or written: {message}")]
    Storage { key: String, message: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    pub fn storage(key: impl Into<String>, message: impl ToString) -> Self {
        TrackerError::Storage {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackerError::InvalidKey { .. }
            | TrackerError::Config(_)
            | TrackerError::UnknownJob(_) => ErrorKind::Invalid,
            TrackerError::Storage { .. } | TrackerError::Json(_) | TrackerError::Io(_) => {
                ErrorKind::Storage
            }
            TrackerError::Fetch(err) => err.kind(),
        }
    }
}
