//! The active process of a run: one invocation per accepted "start turn" job.

pub mod completion;
pub mod dispatch;

pub use completion::CompletionPolicy;
pub use dispatch::{Dispatcher, InProcessDispatcher, TurnJob};

use std::sync::Arc;
use std::time::Duration;

use agentic_run_adapter::{AdapterError, AgentStreamSource};
use agentic_run_common::{error_code, event_type, RunId, RunStatus};
use agentic_run_coordinator::Coordinator;
use agentic_run_store::{RunStore, StoreError};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Bound on re-reading the run and retrying an append after a seq conflict, so a wedged run
/// can't spin the worker forever.
const MAX_APPEND_RETRIES: usize = 5;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub lease_ttl: Duration,
    pub lease_refresh_period: Duration,
}

pub struct Worker {
    store: Arc<dyn RunStore>,
    coordinator: Arc<dyn Coordinator>,
    adapter: Arc<dyn AgentStreamSource>,
    completion_policy: CompletionPolicy,
    config: WorkerConfig,
}

/// How a turn's upstream stream ended, decided before any terminal bookkeeping happens.
enum TurnOutcome {
    Completed,
    Cancelled,
    Adapter(AdapterError),
    LeaseLost,
}

impl Worker {
    pub fn new(
        store: Arc<dyn RunStore>,
        coordinator: Arc<dyn Coordinator>,
        adapter: Arc<dyn AgentStreamSource>,
        completion_policy: CompletionPolicy,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            coordinator,
            adapter,
            completion_policy,
            config,
        }
    }

    pub async fn run_turn(&self, job: TurnJob) {
        let run_id = job.run_id;

        let run = match self.store.get_run(&run_id).await {
            Ok(run) => run,
            Err(err) => {
                error!(%run_id, error = %err, "worker could not load run before starting turn");
                return;
            }
        };
        let turn_seq = run.next_turn_seq();
        let owner = Uuid::new_v4().to_string();

        let acquired = match self
            .coordinator
            .acquire_lease(run_id.as_ref(), turn_seq, &owner, self.config.lease_ttl)
            .await
        {
            Ok(acquired) => acquired,
            Err(err) => {
                error!(%run_id, turn_seq, error = %err, "lease backend unavailable, aborting turn");
                return;
            }
        };
        if !acquired {
            info!(%run_id, turn_seq, "another worker already owns this turn, aborting silently");
            return;
        }

        if let Err(err) = self
            .store
            .set_status(&run_id, RunStatus::Running, run.last_event_seq, None, None)
            .await
        {
            error!(%run_id, turn_seq, error = %err, "failed to transition run to running");
            let _ = self.coordinator.release_lease(run_id.as_ref(), turn_seq, &owner).await;
            return;
        }

        let refresh_stop = CancellationToken::new();
        let lease_lost = CancellationToken::new();
        let refresher = tokio::spawn(self.clone_refresher(run_id.as_ref().to_string(), turn_seq, owner.clone(), refresh_stop.clone(), lease_lost.clone()));

        let outcome = self
            .drive_turn(&run_id, turn_seq, &job, run.last_event_seq, &lease_lost)
            .await;

        refresh_stop.cancel();
        let _ = refresher.await;

        self.finish_turn(&run_id, turn_seq, &owner, outcome).await;
    }

    fn clone_refresher(
        &self,
        run_id: String,
        turn_seq: i64,
        owner: String,
        refresh_stop: CancellationToken,
        lease_lost: CancellationToken,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let coordinator = self.coordinator.clone();
        let period = self.config.lease_refresh_period;
        let ttl = self.config.lease_ttl;
        async move {
            loop {
                tokio::select! {
                    _ = refresh_stop.cancelled() => break,
                    _ = tokio::time::sleep(period) => {
                        match coordinator.refresh_lease(&run_id, turn_seq, &owner, ttl).await {
                            Ok(true) => continue,
                            Ok(false) => {
                                warn!(%run_id, turn_seq, "lease refresh lost ownership");
                                lease_lost.cancel();
                                break;
                            }
                            Err(err) => {
                                warn!(%run_id, turn_seq, error = %err, "lease refresh failed");
                                lease_lost.cancel();
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Appends an event at `last_event_seq + 1`, retrying with a fresh seq if a concurrent
    /// writer won the race. On success, advances `last_event_seq` in place.
    async fn append_event_with_retry(
        &self,
        run_id: &RunId,
        last_event_seq: &mut i64,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<agentic_run_common::RunEvent, StoreError> {
        for attempt in 0..MAX_APPEND_RETRIES {
            let seq = *last_event_seq + 1;
            match self.store.append_event(run_id, seq, event_type, payload.clone()).await {
                Ok(event) => {
                    *last_event_seq = seq;
                    return Ok(event);
                }
                Err(StoreError::Conflict { .. }) => {
                    warn!(%run_id, seq, attempt, "append_event conflict, rereading run and retrying");
                    let run = self.store.get_run(run_id).await?;
                    *last_event_seq = run.last_event_seq;
                }
                Err(err) => return Err(err),
            }
        }
        Err(StoreError::Conflict {
            run_id: run_id.clone(),
            seq: *last_event_seq + 1,
        })
    }

    async fn drive_turn(
        &self,
        run_id: &RunId,
        turn_seq: i64,
        job: &TurnJob,
        mut last_event_seq: i64,
        lease_lost: &CancellationToken,
    ) -> (TurnOutcome, i64, Option<String>) {
        let mut stream = self.adapter.open_stream(
            job.project_id.clone(),
            job.user_message.clone(),
            job.bearer_token.clone(),
            run_id.to_string(),
        );

        let mut latest_output = None;

        let outcome = loop {
            tokio::select! {
                _ = lease_lost.cancelled() => break TurnOutcome::LeaseLost,
                next = stream.next() => {
                    match next {
                        None => break TurnOutcome::Completed,
                        Some(Err(err)) => break TurnOutcome::Adapter(err),
                        Some(Ok(payload)) => {
                            match self.coordinator.is_cancel_requested(run_id.as_ref(), turn_seq).await {
                                Ok(true) => break TurnOutcome::Cancelled,
                                Ok(false) => {}
                                Err(err) => warn!(%run_id, turn_seq, error = %err, "cancel check failed, continuing turn"),
                            }

                            let event_type = payload
                                .get("type")
                                .and_then(serde_json::Value::as_str)
                                .unwrap_or("agent.event")
                                .to_string();

                            match self
                                .append_event_with_retry(run_id, &mut last_event_seq, &event_type, &payload)
                                .await
                            {
                                Ok(event) => {
                                    let live_payload = serde_json::json!({
                                        "seq": event.seq,
                                        "event_type": event.event_type,
                                        "payload": event.payload,
                                    });
                                    if let Err(err) = self.coordinator.publish_live_event(run_id.as_ref(), live_payload.to_string()).await {
                                        warn!(%run_id, turn_seq, error = %err, "live publish failed, journal remains authoritative");
                                    }
                                    if self.completion_policy.is_completion_event(&event_type) {
                                        latest_output = self.completion_policy.extract_output(&payload).or(latest_output);
                                    }
                                }
                                Err(err) => {
                                    error!(%run_id, turn_seq, error = %err, "failed to append event after exhausting retries, failing turn");
                                    break TurnOutcome::Adapter(AdapterError::Generic(err.to_string()));
                                }
                            }
                        }
                    }
                }
            }
        };

        (outcome, last_event_seq, latest_output)
    }

    async fn finish_turn(
        &self,
        run_id: &RunId,
        turn_seq: i64,
        owner: &str,
        outcome: (TurnOutcome, i64, Option<String>),
    ) {
        let (outcome, last_event_seq, latest_output) = outcome;
        let mut seq = last_event_seq;

        let (terminal_event_type, status, terminal_error_code) = match &outcome {
            TurnOutcome::Completed => (event_type::RUN_COMPLETED, RunStatus::Completed, None),
            TurnOutcome::Cancelled => (event_type::RUN_CANCELLED, RunStatus::Cancelled, None),
            TurnOutcome::Adapter(AdapterError::Timeout) => {
                (event_type::RUN_TIMEOUT, RunStatus::Timeout, Some(error_code::AGENT_TIMEOUT.to_string()))
            }
            TurnOutcome::Adapter(err @ AdapterError::UpstreamHttp { .. }) => {
                (event_type::RUN_FAILED, RunStatus::Failed, Some(err.error_code()))
            }
            TurnOutcome::Adapter(AdapterError::Generic(_)) => {
                (event_type::RUN_FAILED, RunStatus::Failed, Some(error_code::AGENT_GENERIC.to_string()))
            }
            TurnOutcome::LeaseLost => {
                (event_type::RUN_FAILED, RunStatus::Failed, Some(error_code::AGENT_LEASE_LOST.to_string()))
            }
        };

        seq += 1;
        if let Err(err) = self
            .store
            .append_event(run_id, seq, terminal_event_type, serde_json::json!({}))
            .await
        {
            error!(%run_id, turn_seq, error = %err, "failed to append terminal event");
        }

        if let Err(err) = self
            .store
            .set_status(run_id, status, seq, latest_output, terminal_error_code)
            .await
        {
            error!(%run_id, turn_seq, error = %err, "failed to set terminal status");
        }

        if !matches!(outcome, TurnOutcome::LeaseLost) {
            if let Err(err) = self.coordinator.release_lease(run_id.as_ref(), turn_seq, owner).await {
                warn!(%run_id, turn_seq, error = %err, "failed to release lease");
            }
        }

        let terminal_marker = serde_json::json!({"seq": seq, "event_type": terminal_event_type, "terminal": true});
        if let Err(err) = self.coordinator.publish_live_event(run_id.as_ref(), terminal_marker.to_string()).await {
            warn!(%run_id, turn_seq, error = %err, "failed to publish terminal marker");
        }

        if let Err(err) = self.coordinator.clear_cancel(run_id.as_ref(), turn_seq).await {
            warn!(%run_id, turn_seq, error = %err, "failed to clear cancel marker");
        }
    }
}
