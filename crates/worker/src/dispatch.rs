//! Job dispatch boundary.
//!
//! The API layer enqueues a "start turn" job through this narrow trait instead of calling the
//! worker algorithm directly from the request handler. The shipped implementation dispatches
//! in-process with `tokio::spawn`, which is sufficient for a single replica. A multi-replica
//! deployment swaps in a message-queue-backed dispatcher behind the same trait; correctness
//! under concurrent dispatch already comes from the turn lease, not from the queue.

use std::sync::Arc;

use agentic_run_common::RunId;

use crate::Worker;

#[derive(Debug, Clone)]
pub struct TurnJob {
    pub run_id: RunId,
    pub project_id: String,
    pub user_message: String,
    pub bearer_token: String,
}

pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: TurnJob);
}

pub struct InProcessDispatcher {
    worker: Arc<Worker>,
}

impl InProcessDispatcher {
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { worker }
    }
}

impl Dispatcher for InProcessDispatcher {
    fn dispatch(&self, job: TurnJob) {
        let worker = self.worker.clone();
        tokio::spawn(async move {
            worker.run_turn(job).await;
        });
    }
}
