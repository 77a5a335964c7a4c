use agentic_run_common::{RunId, RunStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run {0:?} not found")]
    NotFound(RunId),

    #[error("cannot transition run {run_id:?} from {from:?} to {to:?}")]
    IllegalTransition {
        run_id: RunId,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("event seq {seq} for run {run_id:?} was already written by another turn")]
    Conflict { run_id: RunId, seq: i64 },

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}
