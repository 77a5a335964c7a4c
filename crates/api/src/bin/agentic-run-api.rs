use std::sync::Arc;

use agentic_run_adapter::UpstreamAdapter;
use agentic_run_api::{AgenticRunServer, AppState};
use agentic_run_common::{init_tracing, RuntimeConfig};
use agentic_run_coordinator::RedisCoordinator;
use agentic_run_store::PostgresRunStore;
use agentic_run_worker::{CompletionPolicy, Dispatcher, InProcessDispatcher, Worker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RuntimeConfig::from_env()?;
    init_tracing(&config.log_level);

    let store = PostgresRunStore::new(&config.database_url).await?;
    store.run_migrations().await?;
    let store: Arc<dyn agentic_run_store::RunStore> = Arc::new(store);

    let coordinator: Arc<dyn agentic_run_coordinator::Coordinator> =
        Arc::new(RedisCoordinator::new(&config.redis_url).await?);

    let adapter: Arc<dyn agentic_run_adapter::AgentStreamSource> = Arc::new(UpstreamAdapter::new(
        config.agent_service_url.clone(),
        config.run_timeout(),
    ));

    let worker = Arc::new(Worker::new(
        store.clone(),
        coordinator.clone(),
        adapter,
        CompletionPolicy::default(),
        WorkerConfig {
            lease_ttl: config.run_lock_ttl(),
            lease_refresh_period: config.run_lock_refresh(),
        },
    ));
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(InProcessDispatcher::new(worker));

    let state = AppState {
        store,
        coordinator,
        dispatcher,
        sse_heartbeat: config.sse_heartbeat(),
        cancel_ttl: config.cancel_ttl(),
    };

    let addr = config.http_bind_addr.clone();
    AgenticRunServer::new(state).run(&addr).await
}
