use std::sync::Arc;
use std::time::Duration;

use agentic_run_api::server::{AgenticRunServer, AppState};
use agentic_run_common::event_type;
use agentic_run_coordinator::{Coordinator, InMemoryCoordinator};
use agentic_run_store::{InMemoryRunStore, RunStore};
use agentic_run_worker::{Dispatcher, TurnJob};
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use tower::ServiceExt;

struct NoopDispatcher;

impl Dispatcher for NoopDispatcher {
    fn dispatch(&self, _job: TurnJob) {}
}

fn test_state(store: Arc<dyn RunStore>, coordinator: Arc<dyn Coordinator>) -> AppState {
    AppState {
        store,
        coordinator,
        dispatcher: Arc::new(NoopDispatcher),
        sse_heartbeat: Duration::from_secs(3),
        cancel_ttl: Duration::from_secs(30),
    }
}

fn events_request(run_id: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(format!("/runs/{run_id}/events?after_seq=0"))
        .body(Body::empty())
        .unwrap()
}

async fn collect_body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn replay_emits_events_in_order_and_stops_at_the_terminal_event() {
    let store: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
    let coordinator: Arc<dyn Coordinator> = Arc::new(InMemoryCoordinator::new());
    let run = store.create_run("proj", "owner", None).await.unwrap();
    store
        .append_event(&run.id, 1, "assistant.delta", serde_json::json!({"content": "hel"}))
        .await
        .unwrap();
    store
        .append_event(&run.id, 2, event_type::RUN_COMPLETED, serde_json::json!({}))
        .await
        .unwrap();

    let router = AgenticRunServer::new(test_state(store, coordinator)).router();
    let response = router.oneshot(events_request(run.id.as_ref())).await.unwrap();
    let text = collect_body_text(response).await;

    assert!(text.contains("\"seq\":1"));
    assert!(text.contains("assistant.delta"));
    assert!(text.contains("\"seq\":2"));
    assert!(text.contains("run.completed"));
}

#[tokio::test]
async fn a_missed_live_publish_heals_from_the_journal() {
    let store: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
    let coordinator: Arc<dyn Coordinator> = Arc::new(InMemoryCoordinator::new());
    let run = store.create_run("proj", "owner", None).await.unwrap();

    let router = AgenticRunServer::new(test_state(store.clone(), coordinator.clone())).router();
    // The handler subscribes (and reads an empty replay) before returning the response, so by
    // the time this resolves the live subscription is already registered — nothing published
    // below can be missed.
    let response = router.oneshot(events_request(run.id.as_ref())).await.unwrap();

    store
        .append_event(&run.id, 1, "assistant.delta", serde_json::json!({"content": "hel"}))
        .await
        .unwrap();
    store
        .append_event(&run.id, 2, event_type::RUN_COMPLETED, serde_json::json!({}))
        .await
        .unwrap();

    // Only the second seq is published live; the first publish is simulated as lost. The
    // reader must notice the gap and heal both events from the journal.
    coordinator
        .publish_live_event(
            run.id.as_ref(),
            serde_json::json!({"seq": 2, "event_type": event_type::RUN_COMPLETED, "payload": {}, "terminal": true})
                .to_string(),
        )
        .await
        .unwrap();

    let text = collect_body_text(response).await;

    assert!(text.contains("\"seq\":1"));
    assert!(text.contains("assistant.delta"));
    assert!(text.contains("\"seq\":2"));
    assert!(text.contains("run.completed"));
}

#[tokio::test(start_paused = true)]
async fn heartbeats_are_emitted_while_waiting_for_a_live_event() {
    let store: Arc<dyn RunStore> = Arc::new(InMemoryRunStore::new());
    let coordinator: Arc<dyn Coordinator> = Arc::new(InMemoryCoordinator::new());
    let run = store.create_run("proj", "owner", None).await.unwrap();

    let router = AgenticRunServer::new(test_state(store.clone(), coordinator.clone())).router();
    let response = router.oneshot(events_request(run.id.as_ref())).await.unwrap();

    let run_id = run.id.as_ref().to_string();
    let ender = tokio::spawn(async move {
        // Lands inside a poll window, after at least one 3s heartbeat interval has elapsed,
        // but not on a poll-interval boundary, so it resolves via the live channel rather than
        // racing a timeout tick.
        tokio::time::sleep(Duration::from_millis(4_500)).await;
        coordinator
            .publish_live_event(
                &run_id,
                serde_json::json!({"seq": 1, "event_type": event_type::RUN_TIMEOUT, "payload": {}, "terminal": true})
                    .to_string(),
            )
            .await
            .unwrap();
    });

    let text = collect_body_text(response).await;
    ender.await.unwrap();

    assert!(text.contains("ping"), "expected at least one heartbeat comment, got: {text}");
    assert!(text.contains("run.timeout"));
}
