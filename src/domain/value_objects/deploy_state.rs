use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one deploy/pull invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DeployState {
    #[default]
    Idle,
    Preparing,
    InProgress,
    Completed,
    CompletedWithErrors,
    Canceled,
    CanceledWithErrors,
}

impl DeployState {
    /// Final state from the aggregated counts
    pub fn finished(canceled: bool, failed: usize) -> Self {
        match (canceled, failed > 0) {
            (false, false) => Self::Completed,
            (false, true) => Self::CompletedWithErrors,
            (true, false) => Self::Canceled,
            (true, true) => Self::CanceledWithErrors,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithErrors | Self::Canceled | Self::CanceledWithErrors
        )
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled | Self::CanceledWithErrors)
    }
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed with errors",
            Self::Canceled => "canceled",
            Self::CanceledWithErrors => "canceled with errors",
        };
        write!(f, "{}", text)
    }
}

/// Direction of a file transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployDirection {
    /// Local → remote
    Deploy,
    /// Remote → local
    Pull,
}

impl fmt::Display for DeployDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deploy => write!(f, "deploy"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

/// Completion of one file for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Succeeded,
    Failed(String),
    Canceled,
}

impl FileStatus {
    /// Severity used when several plugins report for the same file
    fn severity(&self) -> u8 {
        match self {
            Self::Succeeded => 0,
            Self::Canceled => 1,
            Self::Failed(_) => 2,
        }
    }

    /// Keep the more severe of two statuses
    pub fn worst(self, other: FileStatus) -> FileStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Summary classification that drives the colored status line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeployOutcome {
    /// No file was processed
    Nothing,
    AllSucceeded,
    SomeFailed,
    AllFailed,
}

/// Status indicator color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusColor {
    Warning,
    Error,
}

impl DeployOutcome {
    pub fn classify(failed: usize, total: usize) -> Self {
        if total == 0 {
            Self::Nothing
        } else if failed == 0 {
            Self::AllSucceeded
        } else if failed >= total {
            Self::AllFailed
        } else {
            Self::SomeFailed
        }
    }

    pub fn status_color(&self) -> Option<StatusColor> {
        match self {
            Self::AllFailed => Some(StatusColor::Error),
            Self::SomeFailed => Some(StatusColor::Warning),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_states() {
        assert_eq!(DeployState::finished(false, 0), DeployState::Completed);
        assert_eq!(
            DeployState::finished(false, 2),
            DeployState::CompletedWithErrors
        );
        assert_eq!(DeployState::finished(true, 0), DeployState::Canceled);
        assert_eq!(
            DeployState::finished(true, 1),
            DeployState::CanceledWithErrors
        );
        assert!(DeployState::Canceled.is_terminal());
        assert!(!DeployState::InProgress.is_terminal());
    }

    #[test]
    fn test_worst_status() {
        let failed = FileStatus::Failed("boom".to_string());
        assert_eq!(
            FileStatus::Succeeded.worst(FileStatus::Canceled),
            FileStatus::Canceled
        );
        assert_eq!(FileStatus::Canceled.worst(failed.clone()), failed);
        assert_eq!(failed.clone().worst(FileStatus::Succeeded), failed);
    }

    #[test]
    fn test_outcome_colors() {
        assert_eq!(DeployOutcome::classify(0, 0), DeployOutcome::Nothing);
        assert_eq!(DeployOutcome::classify(0, 3), DeployOutcome::AllSucceeded);
        assert_eq!(DeployOutcome::classify(1, 3), DeployOutcome::SomeFailed);
        assert_eq!(DeployOutcome::classify(3, 3), DeployOutcome::AllFailed);
        assert_eq!(
            DeployOutcome::AllFailed.status_color(),
            Some(StatusColor::Error)
        );
        assert_eq!(
            DeployOutcome::SomeFailed.status_color(),
            Some(StatusColor::Warning)
        );
        assert_eq!(DeployOutcome::AllSucceeded.status_color(), None);
    }
}
