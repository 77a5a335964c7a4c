//! Process-local `RunStore` for tests and single-process development.

use std::collections::HashMap;

use agentic_run_common::{Run, RunEvent, RunId, RunStatus};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::{Result, RunStore};

#[derive(Default)]
struct State {
    runs: HashMap<String, Run>,
    events: HashMap<String, Vec<RunEvent>>,
}

#[derive(Default)]
pub struct InMemoryRunStore {
    state: Mutex<State>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create_run(
        &self,
        project_id: &str,
        owner_id: &str,
        chat_id: Option<&str>,
    ) -> Result<Run> {
        let run = Run {
            id: RunId::new(),
            project_id: project_id.to_string(),
            owner_id: owner_id.to_string(),
            chat_id: chat_id.map(str::to_string),
            status: RunStatus::Queued,
            last_event_seq: 0,
            started_at: None,
            completed_at: None,
            latest_output: None,
            latest_error_code: None,
            created_at: Utc::now(),
        };
        let mut state = self.state.lock().await;
        state.events.insert(run.id.0.clone(), Vec::new());
        state.runs.insert(run.id.0.clone(), run.clone());
        Ok(run)
    }

    async fn get_run(&self, run_id: &RunId) -> Result<Run> {
        let state = self.state.lock().await;
        state
            .runs
            .get(run_id.as_ref())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(run_id.clone()))
    }

    async fn append_event(
        &self,
        run_id: &RunId,
        seq: i64,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<RunEvent> {
        let mut state = self.state.lock().await;
        let current_seq = state
            .runs
            .get(run_id.as_ref())
            .ok_or_else(|| StoreError::NotFound(run_id.clone()))?
            .last_event_seq;

        if seq != current_seq + 1 {
            return Err(StoreError::Conflict {
                run_id: run_id.clone(),
                seq,
            });
        }

        let event = RunEvent {
            run_id: run_id.clone(),
            seq,
            event_type: event_type.to_string(),
            payload,
            created_at: Utc::now(),
        };
        state.events.entry(run_id.0.clone()).or_default().push(event.clone());
        state.runs.get_mut(run_id.as_ref()).unwrap().last_event_seq = seq;
        Ok(event)
    }

    async fn list_events(&self, run_id: &RunId, after_seq: i64) -> Result<Vec<RunEvent>> {
        let state = self.state.lock().await;
        let mut events: Vec<RunEvent> = state
            .events
            .get(run_id.as_ref())
            .map(|events| events.iter().filter(|event| event.seq > after_seq).cloned().collect())
            .unwrap_or_default();
        events.sort_by_key(|event| event.seq);
        Ok(events)
    }

    async fn set_status(
        &self,
        run_id: &RunId,
        next: RunStatus,
        last_event_seq: i64,
        latest_output: Option<String>,
        latest_error_code: Option<String>,
    ) -> Result<Run> {
        let mut state = self.state.lock().await;
        let run = state
            .runs
            .get_mut(run_id.as_ref())
            .ok_or_else(|| StoreError::NotFound(run_id.clone()))?;

        if !run.status.can_transition_to(next) {
            return Err(StoreError::IllegalTransition {
                run_id: run_id.clone(),
                from: run.status,
                to: next,
            });
        }

        run.status = next;
        run.last_event_seq = last_event_seq;
        if let Some(output) = latest_output {
            run.latest_output = Some(output);
        }
        if let Some(code) = latest_error_code {
            run.latest_error_code = Some(code);
        }
        if matches!(next, RunStatus::Running) && run.started_at.is_none() {
            run.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            run.completed_at = Some(Utc::now());
        }
        Ok(run.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryRunStore::new();
        let run = store.create_run("proj", "owner", None).await.unwrap();
        let fetched = store.get_run(&run.id).await.unwrap();
        assert_eq!(fetched.id, run.id);
        assert_eq!(fetched.status, RunStatus::Queued);
    }

    #[tokio::test]
    async fn appending_a_duplicate_seq_conflicts() {
        let store = InMemoryRunStore::new();
        let run = store.create_run("proj", "owner", None).await.unwrap();
        store.append_event(&run.id, 1, "agent.chunk", serde_json::json!({})).await.unwrap();
        let result = store.append_event(&run.id, 1, "agent.chunk", serde_json::json!({})).await;
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let store = InMemoryRunStore::new();
        let run = store.create_run("proj", "owner", None).await.unwrap();
        store.set_status(&run.id, RunStatus::Completed, 0, None, None).await.unwrap();
        let result = store.set_status(&run.id, RunStatus::Running, 0, None, None).await;
        assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));
    }
}
