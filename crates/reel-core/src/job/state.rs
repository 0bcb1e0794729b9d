//! Job lifecycle state machine.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Downloading,
    Compositing,
    Remuxing,
    Uploading,
    Completed,
    /// Failure with the full error chain.
    Failed(String),
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid job state transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

impl JobState {
    pub fn name(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Downloading => "downloading",
            JobState::Compositing => "compositing",
            JobState::Remuxing => "remuxing",
            JobState::Uploading => "uploading",
            JobState::Completed => "completed",
            JobState::Failed(_) => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed(_) | JobState::Cancelled
        )
    }

    /// Stages advance one step at a time; failure and cancellation are
    /// reachable from any non-terminal state; terminal states are final.
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        use JobState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed(_)) | (_, Cancelled) => true,
            (Pending, Downloading)
            | (Downloading, Compositing)
            | (Compositing, Remuxing)
            | (Remuxing, Uploading)
            | (Uploading, Completed) => true,
            _ => false,
        }
    }

    pub fn transition(self, next: JobState) -> Result<JobState, InvalidTransition> {
        if self.can_transition_to(&next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.name()),
        }
    }
}
