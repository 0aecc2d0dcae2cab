use serde::Serialize;

use crate::AutodriveError;

/// Terminal status of a scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Stopped,
    Failed,
    Timeout,
    Empty,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Stopped => "stopped",
            RunStatus::Failed => "failed",
            RunStatus::Timeout => "timeout",
            RunStatus::Empty => "empty",
        }
    }
}

#[derive(Debug)]
pub struct ScenarioRunResult {
    pub status: RunStatus,
    pub last_scene: Option<String>,
    pub error: Option<AutodriveError>,
}

impl ScenarioRunResult {
    pub fn success(last_scene: Option<String>) -> Self {
        Self {
            status: RunStatus::Success,
            last_scene,
            error: None,
        }
    }

    pub fn stopped(last_scene: Option<String>, error: Option<AutodriveError>) -> Self {
        Self {
            status: RunStatus::Stopped,
            last_scene,
            error,
        }
    }

    pub fn failed(last_scene: Option<String>, error: AutodriveError) -> Self {
        Self {
            status: RunStatus::Failed,
            last_scene,
            error: Some(error),
        }
    }

    pub fn timeout(last_scene: Option<String>, error: AutodriveError) -> Self {
        Self {
            status: RunStatus::Timeout,
            last_scene,
            error: Some(error),
        }
    }

    pub fn empty() -> Self {
        Self {
            status: RunStatus::Empty,
            last_scene: None,
            error: Some(AutodriveError::EmptyScript),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn was_cancelled(&self) -> bool {
        matches!(self.error, Some(AutodriveError::Cancelled))
    }
}
