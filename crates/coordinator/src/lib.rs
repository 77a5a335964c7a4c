//! Turn lease / cancel coordinator: the only producer of durable events for a given turn.
//!
//! This crate is a thin abstraction over a shared key-value store with pub/sub. It provides
//! the atomic compare-and-set primitives §4.A of the spec requires (acquire, refresh, release)
//! plus the cancel marker and live event channel. The Redis-backed implementation is what ships
//! to production; the in-memory implementation backs tests and single-process development and
//! must honour the exact same atomicity contract.

pub mod error;
pub mod in_memory;
pub mod keys;
pub mod redis_coordinator;

pub use error::CoordinatorError;
pub use in_memory::InMemoryCoordinator;
pub use redis_coordinator::RedisCoordinator;

use std::time::Duration;

use async_trait::async_trait;

pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Atomic lease, cancel-marker, and pub/sub primitives over `(run_id, turn_seq)`.
///
/// Every mutating operation either completes its intended mutation or leaves state untouched —
/// there is no partial lease state observable by a caller racing a network error.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Atomically sets the lease key to `owner` only if it was absent, with the given TTL.
    /// Returns `true` exactly when this call performed the set.
    async fn acquire_lease(
        &self,
        run_id: &str,
        turn_seq: i64,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool>;

    /// Extends the lease TTL iff the current owner is still `owner` (compare-and-extend).
    async fn refresh_lease(
        &self,
        run_id: &str,
        turn_seq: i64,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool>;

    /// Deletes the lease iff the current owner is still `owner` (compare-and-delete).
    async fn release_lease(&self, run_id: &str, turn_seq: i64, owner: &str) -> Result<bool>;

    /// Returns the current lease owner, if any.
    async fn get_lease_owner(&self, run_id: &str, turn_seq: i64) -> Result<Option<String>>;

    /// Sets a cancel marker with the given TTL so stale cancel requests expire on their own.
    async fn request_cancel(&self, run_id: &str, turn_seq: i64, ttl: Duration) -> Result<()>;

    /// Whether a cancel marker is currently set for this turn.
    async fn is_cancel_requested(&self, run_id: &str, turn_seq: i64) -> Result<bool>;

    /// Clears the cancel marker.
    async fn clear_cancel(&self, run_id: &str, turn_seq: i64) -> Result<()>;

    /// Best-effort publish of an already-serialised event to the run's live channel.
    async fn publish_live_event(&self, run_id: &str, payload: String) -> Result<()>;

    /// Subscribes to the run's live channel. The subscription guarantees unsubscribe on drop.
    async fn subscribe_live_events(&self, run_id: &str) -> Result<Box<dyn LiveSubscription>>;
}

/// A scoped subscription to a run's live event channel.
#[async_trait]
pub trait LiveSubscription: Send {
    /// Waits up to `timeout` for the next published message, returning `None` on timeout.
    async fn read_live_event(&mut self, timeout: Duration) -> Result<Option<String>>;
}
