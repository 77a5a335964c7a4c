use axum::extract::{Path, State};
use axum::response::Json;
use tracing::{info, instrument};

use agentic_run_common::RunId;
use agentic_run_worker::{Dispatcher, TurnJob};

use crate::auth::BearerToken;
use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{CancelRunResponse, CreateRunRequest, CreateRunResponse, RunResponse};

#[instrument(skip(state, token, body), fields(project_id = %body.project_id))]
pub async fn create_run(
    State(state): State<AppState>,
    token: BearerToken,
    Json(body): Json<CreateRunRequest>,
) -> Result<Json<CreateRunResponse>, ApiError> {
    if body.user_message.trim().is_empty() {
        return Err(ApiError::BadRequest("user_message must not be empty".into()));
    }

    // owner_id is out of scope for the auth layer here; the bearer token stands in as the
    // caller's identity until a real session store is wired up.
    let run = state
        .store
        .create_run(&body.project_id, &token.0, body.chat_id.as_deref())
        .await?;

    info!(run_id = %run.id, "run created, dispatching turn");

    state.dispatcher.dispatch(TurnJob {
        run_id: run.id.clone(),
        project_id: body.project_id,
        user_message: body.user_message,
        bearer_token: token.0,
    });

    Ok(Json(CreateRunResponse { run_id: run.id.to_string() }))
}

#[instrument(skip(state))]
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let run = state.store.get_run(&RunId::from(run_id)).await?;
    Ok(Json(run.into()))
}

/// A run has exactly one turn in its lifetime (`POST /runs` both creates the run and enqueues
/// its only turn), so the lease/cancel key's `turn_seq` component is always 1.
const SOLE_TURN_SEQ: i64 = 1;

#[instrument(skip(state))]
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<CancelRunResponse>, ApiError> {
    let run = state.store.get_run(&RunId::from(run_id)).await?;
    state
        .coordinator
        .request_cancel(run.id.as_ref(), SOLE_TURN_SEQ, state.cancel_ttl)
        .await?;
    Ok(Json(CancelRunResponse { accepted: true }))
}
