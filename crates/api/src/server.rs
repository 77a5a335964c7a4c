use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use agentic_run_coordinator::Coordinator;
use agentic_run_store::RunStore;
use agentic_run_worker::Dispatcher;

use crate::middleware::logging::logging_middleware;
use crate::routes;

/// Shared state handed to every route. Cheap to clone: everything behind it is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RunStore>,
    pub coordinator: Arc<dyn Coordinator>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub sse_heartbeat: Duration,
    pub cancel_ttl: Duration,
}

pub struct AgenticRunServer {
    state: AppState,
}

impl AgenticRunServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/runs", post(routes::runs::create_run))
            .route("/runs/:run_id", get(routes::runs::get_run))
            .route("/runs/:run_id/cancel", post(routes::runs::cancel_run))
            .route("/runs/:run_id/events", get(routes::stream::stream_events))
            .route("/health", get(routes::health::health))
            .layer(axum::middleware::from_fn(logging_middleware))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "agentic run api listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}
