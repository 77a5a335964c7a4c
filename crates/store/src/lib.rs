//! Durable run and event journal.
//!
//! The store is the single source of truth for a run's status and its ordered event log.
//! Every event is appended under a unique `(run_id, seq)` constraint so that two workers racing
//! to write the same turn's events produce one writer and one conflict, never a silent
//! overwrite.

pub mod error;
pub mod in_memory;
pub mod postgres;

pub use error::StoreError;
pub use in_memory::InMemoryRunStore;
pub use postgres::PostgresRunStore;

use agentic_run_common::{Run, RunEvent, RunId, RunStatus};
use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Creates a new run in `Queued` status.
    async fn create_run(
        &self,
        project_id: &str,
        owner_id: &str,
        chat_id: Option<&str>,
    ) -> Result<Run>;

    /// Fetches a run by id.
    async fn get_run(&self, run_id: &RunId) -> Result<Run>;

    /// Appends an event at `seq`. Fails with [`StoreError::Conflict`] if `seq` was already
    /// written for this run by a concurrent writer.
    async fn append_event(
        &self,
        run_id: &RunId,
        seq: i64,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<RunEvent>;

    /// Lists events for a run with `seq > after_seq`, ordered by `seq`.
    async fn list_events(&self, run_id: &RunId, after_seq: i64) -> Result<Vec<RunEvent>>;

    /// Transitions a run's status, enforcing [`RunStatus::can_transition_to`]. Also updates
    /// `last_event_seq` and, for terminal transitions, `completed_at`.
    async fn set_status(
        &self,
        run_id: &RunId,
        next: RunStatus,
        last_event_seq: i64,
        latest_output: Option<String>,
        latest_error_code: Option<String>,
    ) -> Result<Run>;
}
