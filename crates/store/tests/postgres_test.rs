use agentic_run_common::{error_code, event_type, RunStatus};
use agentic_run_store::{PostgresRunStore, RunStore, StoreError};

fn get_test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set (use docker-compose.test.yml)")
}

async fn setup_test_store() -> PostgresRunStore {
    let store = PostgresRunStore::new(&get_test_db_url())
        .await
        .expect("failed to connect to test database");
    store.run_migrations().await.expect("failed to run migrations");
    store
}

#[tokio::test]
#[ignore]
async fn create_run_starts_queued_with_no_events() {
    let store = setup_test_store().await;

    let run = store
        .create_run("proj-1", "owner-1", None)
        .await
        .expect("create_run failed");

    assert_eq!(run.status, RunStatus::Queued);
    assert_eq!(run.last_event_seq, 0);
    assert_eq!(run.next_turn_seq(), 1);
}

#[tokio::test]
#[ignore]
async fn appending_the_same_seq_twice_yields_a_conflict() {
    let store = setup_test_store().await;
    let run = store.create_run("proj-1", "owner-1", None).await.unwrap();

    store
        .append_event(&run.id, 1, event_type::RUN_STARTED, serde_json::json!({}))
        .await
        .expect("first append should succeed");

    let result = store
        .append_event(&run.id, 1, event_type::RUN_STARTED, serde_json::json!({}))
        .await;

    assert!(matches!(result, Err(StoreError::Conflict { .. })));
}

#[tokio::test]
#[ignore]
async fn list_events_only_returns_events_after_the_given_seq() {
    let store = setup_test_store().await;
    let run = store.create_run("proj-1", "owner-1", None).await.unwrap();

    for seq in 1..=3 {
        store
            .append_event(&run.id, seq, "agent.chunk", serde_json::json!({"seq": seq}))
            .await
            .unwrap();
    }

    let events = store.list_events(&run.id, 1).await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].seq, 2);
    assert_eq!(events[1].seq, 3);
}

#[tokio::test]
#[ignore]
async fn set_status_rejects_transitions_out_of_a_terminal_state() {
    let store = setup_test_store().await;
    let run = store.create_run("proj-1", "owner-1", None).await.unwrap();

    store
        .set_status(&run.id, RunStatus::Running, 0, None, None)
        .await
        .unwrap();
    store
        .set_status(&run.id, RunStatus::Completed, 1, Some("done".into()), None)
        .await
        .unwrap();

    let result = store
        .set_status(&run.id, RunStatus::Running, 1, None, None)
        .await;

    assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));
}

#[tokio::test]
#[ignore]
async fn set_status_to_failed_records_the_error_code() {
    let store = setup_test_store().await;
    let run = store.create_run("proj-1", "owner-1", None).await.unwrap();
    store
        .set_status(&run.id, RunStatus::Running, 0, None, None)
        .await
        .unwrap();

    let run = store
        .set_status(
            &run.id,
            RunStatus::Failed,
            1,
            None,
            Some(error_code::AGENT_TIMEOUT.to_string()),
        )
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.latest_error_code.as_deref(), Some(error_code::AGENT_TIMEOUT));
    assert!(run.completed_at.is_some());
}
