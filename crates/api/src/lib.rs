//! HTTP surface of the agentic run subsystem.
//!
//! Five endpoints over the Coordinator, Run Store and Worker built by the sibling crates:
//! `POST /runs` accepts a turn and dispatches it, `POST /runs/{run_id}/cancel` marks it for
//! cancellation, `GET /runs/{run_id}` reads the run record, `GET /runs/{run_id}/events` serves
//! the run's event journal as a resumable SSE stream, and `GET /health` reports liveness.

pub mod auth;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;

pub use server::{AgenticRunServer, AppState};
