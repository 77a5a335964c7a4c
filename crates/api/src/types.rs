//! Request/response bodies for the agentic run HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agentic_run_common::{Run, RunStatus};

/// Body of `POST /runs`.
#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    pub project_id: String,
    pub user_message: String,
    pub chat_id: Option<String>,
}

/// Response of `POST /runs`.
#[derive(Debug, Serialize)]
pub struct CreateRunResponse {
    pub run_id: String,
}

/// Response of `POST /runs/{run_id}/cancel`. Always `true`: cancellation is idempotent and
/// accepted regardless of whether a worker currently owns the turn.
#[derive(Debug, Serialize)]
pub struct CancelRunResponse {
    pub accepted: bool,
}

/// Response of `GET /runs/{run_id}`.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: String,
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

impl From<Run> for RunResponse {
    fn from(run: Run) -> Self {
        Self {
            run_id: run.id.to_string(),
            project_id: run.project_id,
            owner_id: run.owner_id,
            chat_id: run.chat_id,
            status: run.status,
            last_event_seq: run.last_event_seq,
            started_at: run.started_at,
            completed_at: run.completed_at,
            latest_output: run.latest_output,
            latest_error_code: run.latest_error_code,
            created_at: run.created_at,
        }
    }
}

/// One frame of the `GET /runs/{run_id}/events` stream.
#[derive(Debug, Serialize)]
pub struct EventFrame {
    pub seq: i64,
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Response of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Error body returned for every non-2xx response from this API.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ErrorResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self { detail: detail.into() }
    }
}
