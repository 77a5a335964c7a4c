use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use futures::Stream;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{instrument, warn};

use agentic_run_common::{RunEvent, RunId};
use agentic_run_coordinator::LiveSubscription;
use agentic_run_store::RunStore;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::EventFrame;

/// How often the live subscription is polled between heartbeat checks. Independent of the
/// heartbeat interval itself, which is typically much longer.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    after_seq: i64,
}

fn is_terminal_event_type(event_type: &str) -> bool {
    matches!(event_type, "run.completed" | "run.failed" | "run.timeout" | "run.cancelled")
}

fn frame(event: &RunEvent) -> Event {
    let data = serde_json::to_string(&EventFrame {
        seq: event.seq,
        event_type: event.event_type.clone(),
        payload: event.payload.clone(),
    })
    .unwrap_or_else(|_| "{}".to_string());
    Event::default().data(data)
}

#[instrument(skip(state))]
pub async fn stream_events(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if query.after_seq < 0 {
        return Err(ApiError::BadRequest("after_seq must not be negative".into()));
    }
    let run_id = RunId::from(run_id);

    // Subscribe before the replay read so nothing published in between is lost.
    let subscription = state.coordinator.subscribe_live_events(run_id.as_ref()).await?;
    let replay = state.store.list_events(&run_id, query.after_seq).await?;

    let stream = build_event_stream(
        state.store.clone(),
        run_id,
        query.after_seq,
        replay,
        subscription,
        state.sse_heartbeat,
    );

    Ok(Sse::new(stream))
}

/// Builds the replay-then-live-tail stream, split out from the handler so it can be driven
/// directly in tests without going through an HTTP request.
pub fn build_event_stream(
    store: Arc<dyn RunStore>,
    run_id: RunId,
    after_seq: i64,
    replay: Vec<RunEvent>,
    mut subscription: Box<dyn LiveSubscription>,
    heartbeat_every: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        let mut watermark = after_seq;

        for event in &replay {
            watermark = event.seq;
            yield Ok(frame(event));
            if is_terminal_event_type(&event.event_type) {
                return;
            }
        }

        let mut last_heartbeat = Instant::now();

        loop {
            match subscription.read_live_event(POLL_INTERVAL).await {
                Ok(Some(raw)) => {
                    let parsed: serde_json::Value = match serde_json::from_str(&raw) {
                        Ok(parsed) => parsed,
                        Err(_) => continue,
                    };
                    let seq = parsed.get("seq").and_then(serde_json::Value::as_i64).unwrap_or(watermark);

                    if seq <= watermark {
                        continue;
                    }
                    if seq > watermark + 1 {
                        // Gap: a publish was missed. Heal from the journal, which is authoritative.
                        match store.list_events(&run_id, watermark).await {
                            Ok(missing) => {
                                let mut healed_to_terminal = false;
                                for event in &missing {
                                    watermark = event.seq;
                                    yield Ok(frame(event));
                                    if is_terminal_event_type(&event.event_type) {
                                        healed_to_terminal = true;
                                        break;
                                    }
                                }
                                if healed_to_terminal {
                                    return;
                                }
                            }
                            Err(err) => warn!(%run_id, error = %err, "gap heal read failed, retrying on next message"),
                        }
                        continue;
                    }

                    watermark = seq;
                    let event_type = parsed
                        .get("event_type")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let payload = parsed.get("payload").cloned().unwrap_or(serde_json::Value::Null);
                    yield Ok(Event::default().data(
                        serde_json::to_string(&EventFrame { seq, event_type: event_type.clone(), payload })
                            .unwrap_or_else(|_| "{}".to_string()),
                    ));
                    if is_terminal_event_type(&event_type) {
                        return;
                    }
                }
                Ok(None) => {
                    if last_heartbeat.elapsed() >= heartbeat_every {
                        last_heartbeat = Instant::now();
                        yield Ok(Event::default().comment("ping"));
                    }
                }
                Err(err) => {
                    warn!(%run_id, error = %err, "live subscription read failed, ending stream");
                    return;
                }
            }
        }
    }
}
