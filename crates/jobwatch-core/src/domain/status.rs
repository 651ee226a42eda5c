//! Remote job state machines.
//!
//! Both trackers share one shape: a linear chain of phases ending in a
//! success terminal, plus failure terminals reachable from any non-terminal
//! phase. The server is the source of truth for the current status; these
//! types only decide whether a reported status is a legal forward move.

use std::fmt;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Phase rank used by failure terminals (reachable from everywhere).
const FAILURE_PHASE: u8 = u8::MAX;

/// JobStatus は Tracker を具体化するための状態型
///
/// # 状態遷移のルール
/// - 同じ状態への遷移は常に許可（冪等な再ポーリング）
/// - 終端状態からはどこにも遷移しない
/// - それ以外は phase が大きくなる方向のみ（後退しない）
pub trait JobStatus:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Tracker instantiation name ("training", "deployment").
    const TRACKER: &'static str;

    /// Status a freshly seeded record starts in.
    fn initial() -> Self;

    /// Position in the forward-only chain.
    fn phase(self) -> u8;

    fn is_terminal(self) -> bool;

    /// Terminal and successful (fires the completion hook).
    fn is_success(self) -> bool;

    /// Whether the metrics endpoint is meaningful in this phase.
    fn collects_metrics(self) -> bool;

    /// Returns true when this status can transition to `next`.
    fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next.phase() > self.phase()
    }
}

/// Training job: `SETTING_UP → DOWNLOADING_DATA → TRAINING → DONE`, `FAILED` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainingStatus {
    SettingUp,
    DownloadingData,
    Training,
    Done,
    Failed,
}

impl TrainingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrainingStatus::SettingUp => "SETTING_UP",
            TrainingStatus::DownloadingData => "DOWNLOADING_DATA",
            TrainingStatus::Training => "TRAINING",
            TrainingStatus::Done => "DONE",
            TrainingStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JobStatus for TrainingStatus {
    const TRACKER: &'static str = "training";

    fn initial() -> Self {
        TrainingStatus::SettingUp
    }

    fn phase(self) -> u8 {
        match self {
            TrainingStatus::SettingUp => 0,
            TrainingStatus::DownloadingData => 1,
            TrainingStatus::Training => 2,
            TrainingStatus::Done => 3,
            TrainingStatus::Failed => FAILURE_PHASE,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, TrainingStatus::Done | TrainingStatus::Failed)
    }

    fn is_success(self) -> bool {
        self == TrainingStatus::Done
    }

    fn collects_metrics(self) -> bool {
        // DONE も含める: 最終エポックのスコアを記録に残すため
        matches!(self, TrainingStatus::Training | TrainingStatus::Done)
    }
}

/// Deployment job: `CREATING_INSTANCE → SETTING_UP → DOWNLOADING_MODEL → ONLINE`,
/// `OFFLINE` / `FAILED` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    CreatingInstance,
    SettingUp,
    DownloadingModel,
    Online,
    Offline,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::CreatingInstance => "CREATING_INSTANCE",
            DeploymentStatus::SettingUp => "SETTING_UP",
            DeploymentStatus::DownloadingModel => "DOWNLOADING_MODEL",
            DeploymentStatus::Online => "ONLINE",
            DeploymentStatus::Offline => "OFFLINE",
            DeploymentStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl JobStatus for DeploymentStatus {
    const TRACKER: &'static str = "deployment";

    fn initial() -> Self {
        DeploymentStatus::CreatingInstance
    }

    fn phase(self) -> u8 {
        match self {
            DeploymentStatus::CreatingInstance => 0,
            DeploymentStatus::SettingUp => 1,
            DeploymentStatus::DownloadingModel => 2,
            DeploymentStatus::Online => 3,
            DeploymentStatus::Offline | DeploymentStatus::Failed => FAILURE_PHASE,
        }
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Online | DeploymentStatus::Offline | DeploymentStatus::Failed
        )
    }

    fn is_success(self) -> bool {
        self == DeploymentStatus::Online
    }

    fn collects_metrics(self) -> bool {
        false
    }
}
