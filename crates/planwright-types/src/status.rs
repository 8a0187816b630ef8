//! Per-step execution status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Execution state of a single step within a plan run.
///
/// Allowed transitions:
///
/// ```text
/// pending -> ready | error
/// ready   -> running | error
/// running -> success | error
/// error   -> running | skipped | error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Ready,
    Running,
    Success,
    Error,
    Skipped,
}

impl StepStatus {
    /// Whether the step has finished, for better or worse.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Error | StepStatus::Skipped)
    }

    /// Whether `next` is a legal successor of this status.
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Error)
                | (Ready, Running)
                | (Ready, Error)
                | (Running, Success)
                | (Running, Error)
                | (Error, Running)
                | (Error, Skipped)
                | (Error, Error)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Ready => "ready",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Error => "error",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "ready" => Ok(StepStatus::Ready),
            "running" => Ok(StepStatus::Running),
            "success" => Ok(StepStatus::Success),
            "error" => Ok(StepStatus::Error),
            "skipped" => Ok(StepStatus::Skipped),
            other => Err(format!("invalid step status: '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(StepStatus::Success.is_terminal());
        assert!(StepStatus::Error.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Ready.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
    }

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(StepStatus::Pending.can_transition_to(StepStatus::Ready));
        assert!(StepStatus::Ready.can_transition_to(StepStatus::Running));
        assert!(StepStatus::Running.can_transition_to(StepStatus::Success));
        assert!(StepStatus::Running.can_transition_to(StepStatus::Error));
    }

    #[test]
    fn test_only_error_goes_backward() {
        assert!(StepStatus::Error.can_transition_to(StepStatus::Running));
        assert!(!StepStatus::Success.can_transition_to(StepStatus::Running));
        assert!(!StepStatus::Skipped.can_transition_to(StepStatus::Running));
        assert!(!StepStatus::Running.can_transition_to(StepStatus::Ready));
        assert!(!StepStatus::Success.can_transition_to(StepStatus::Error));
    }

    #[test]
    fn test_skip_only_from_error() {
        assert!(StepStatus::Error.can_transition_to(StepStatus::Skipped));
        assert!(!StepStatus::Pending.can_transition_to(StepStatus::Skipped));
        assert!(!StepStatus::Running.can_transition_to(StepStatus::Skipped));
    }

    #[test]
    fn test_display_from_str_roundtrip() {
        for status in [
            StepStatus::Pending,
            StepStatus::Ready,
            StepStatus::Running,
            StepStatus::Success,
            StepStatus::Error,
            StepStatus::Skipped,
        ] {
            let parsed: StepStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("regenerating".parse::<StepStatus>().is_err());
    }
}
