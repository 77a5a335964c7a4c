//! Domain types shared by every component of the agentic run subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque, globally unique identifier for a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(format!("run_{}", Uuid::new_v4()))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of a run. Moves only forward: `Queued -> Running -> {terminal}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl RunStatus {
    /// True once a run has reached a status from which no further transition is legal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Timeout | RunStatus::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a legal transition per the status table.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        match self {
            Queued => matches!(next, Running | Completed | Failed | Timeout | Cancelled),
            Running => matches!(next, Completed | Failed | Timeout | Cancelled),
            Completed | Failed | Timeout | Cancelled => false,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Timeout => "timeout",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Authoritative record for a single agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub project_id: String,
    pub owner_id: String,
    pub chat_id: Option<String>,
    pub status: RunStatus,
    pub last_event_seq: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub latest_output: Option<String>,
    pub latest_error_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Run {
    /// The turn a worker should open next: the run has no turn in flight yet.
    pub fn next_turn_seq(&self) -> i64 {
        self.last_event_seq + 1
    }
}

/// One entry in a run's append-only event journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: RunId,
    pub seq: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Event type constants the worker itself produces (as opposed to ones relayed verbatim
/// from the upstream agent service).
pub mod event_type {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_FAILED: &str = "run.failed";
    pub const RUN_TIMEOUT: &str = "run.timeout";
    pub const RUN_CANCELLED: &str = "run.cancelled";
}

/// Error codes recorded on `Run::latest_error_code`.
pub mod error_code {
    pub const AGENT_TIMEOUT: &str = "AGENT_TIMEOUT";
    pub const AGENT_GENERIC: &str = "AGENT_GENERIC";
    pub const AGENT_LEASE_LOST: &str = "AGENT_LEASE_LOST";

    pub fn agent_upstream(status: u16) -> String {
        format!("AGENT_UPSTREAM_{status}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transition_table_matches_spec() {
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Cancelled));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Queued));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Cancelled.can_transition_to(RunStatus::Failed));
    }

    #[test]
    fn terminal_statuses_are_exactly_the_four_outcomes() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Timeout.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn next_turn_seq_opens_the_turn_after_the_last_persisted_event() {
        let run = Run {
            id: RunId::new(),
            project_id: "p".into(),
            owner_id: "o".into(),
            chat_id: None,
            status: RunStatus::Queued,
            last_event_seq: 4,
            started_at: None,
            completed_at: None,
            latest_output: None,
            latest_error_code: None,
            created_at: Utc::now(),
        };
        assert_eq!(run.next_turn_seq(), 5);
    }
}
