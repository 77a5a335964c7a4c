//! Process-local `Coordinator` for tests and single-process development.
//!
//! Honours the same compare-and-mutate contract as [`crate::RedisCoordinator`]: every lease and
//! cancel-marker mutation takes a single write-lock covering the check and the write, so no
//! caller can observe a state between "checked" and "mutated".

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::keys::{turn_cancel_key, turn_lease_key};
use crate::{Coordinator, LiveSubscription, Result};

#[derive(Clone)]
struct LeaseEntry {
    owner: String,
    expires_at: Instant,
}

impl LeaseEntry {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Default)]
pub struct InMemoryCoordinator {
    leases: RwLock<HashMap<String, LeaseEntry>>,
    cancels: RwLock<HashMap<String, Instant>>,
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl InMemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel_for(&self, run_id: &str) -> broadcast::Sender<String> {
        if let Some(tx) = self.channels.read().await.get(run_id) {
            return tx.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(run_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl Coordinator for InMemoryCoordinator {
    async fn acquire_lease(
        &self,
        run_id: &str,
        turn_seq: i64,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let key = turn_lease_key(run_id, turn_seq);
        let mut leases = self.leases.write().await;
        if let Some(existing) = leases.get(&key) {
            if existing.is_live() {
                return Ok(false);
            }
        }
        leases.insert(
            key,
            LeaseEntry {
                owner: owner.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn refresh_lease(
        &self,
        run_id: &str,
        turn_seq: i64,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let key = turn_lease_key(run_id, turn_seq);
        let mut leases = self.leases.write().await;
        match leases.get_mut(&key) {
            Some(entry) if entry.is_live() && entry.owner == owner => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lease(&self, run_id: &str, turn_seq: i64, owner: &str) -> Result<bool> {
        let key = turn_lease_key(run_id, turn_seq);
        let mut leases = self.leases.write().await;
        match leases.get(&key) {
            Some(entry) if entry.is_live() && entry.owner == owner => {
                leases.remove(&key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_lease_owner(&self, run_id: &str, turn_seq: i64) -> Result<Option<String>> {
        let key = turn_lease_key(run_id, turn_seq);
        let leases = self.leases.read().await;
        Ok(leases
            .get(&key)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.owner.clone()))
    }

    async fn request_cancel(&self, run_id: &str, turn_seq: i64, ttl: Duration) -> Result<()> {
        let key = turn_cancel_key(run_id, turn_seq);
        self.cancels.write().await.insert(key, Instant::now() + ttl);
        Ok(())
    }

    async fn is_cancel_requested(&self, run_id: &str, turn_seq: i64) -> Result<bool> {
        let key = turn_cancel_key(run_id, turn_seq);
        let cancels = self.cancels.read().await;
        Ok(cancels.get(&key).is_some_and(|expires_at| Instant::now() < *expires_at))
    }

    async fn clear_cancel(&self, run_id: &str, turn_seq: i64) -> Result<()> {
        let key = turn_cancel_key(run_id, turn_seq);
        self.cancels.write().await.remove(&key);
        Ok(())
    }

    async fn publish_live_event(&self, run_id: &str, payload: String) -> Result<()> {
        let tx = self.channel_for(run_id).await;
        // No receivers is not an error: the journal, not the live channel, is authoritative.
        let _ = tx.send(payload);
        Ok(())
    }

    async fn subscribe_live_events(&self, run_id: &str) -> Result<Box<dyn LiveSubscription>> {
        let tx = self.channel_for(run_id).await;
        Ok(Box::new(InMemoryLiveSubscription { rx: tx.subscribe() }))
    }
}

struct InMemoryLiveSubscription {
    rx: broadcast::Receiver<String>,
}

#[async_trait]
impl LiveSubscription for InMemoryLiveSubscription {
    async fn read_live_event(&mut self, timeout: Duration) -> Result<Option<String>> {
        loop {
            match tokio::time::timeout(timeout, self.rx.recv()).await {
                Ok(Ok(payload)) => return Ok(Some(payload)),
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => return Ok(None),
                Err(_elapsed) => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_one_acquire_succeeds_for_a_contended_lease() {
        let coordinator = InMemoryCoordinator::new();
        let ttl = Duration::from_secs(30);

        let first = coordinator.acquire_lease("r1", 1, "owner-a", ttl).await.unwrap();
        let second = coordinator.acquire_lease("r1", 1, "owner-b", ttl).await.unwrap();

        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn refresh_only_succeeds_for_the_current_owner() {
        let coordinator = InMemoryCoordinator::new();
        let ttl = Duration::from_secs(30);
        coordinator.acquire_lease("r1", 1, "owner-a", ttl).await.unwrap();

        assert!(coordinator.refresh_lease("r1", 1, "owner-a", ttl).await.unwrap());
        assert!(!coordinator.refresh_lease("r1", 1, "owner-b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn release_only_succeeds_for_the_current_owner_then_frees_the_lease() {
        let coordinator = InMemoryCoordinator::new();
        let ttl = Duration::from_secs(30);
        coordinator.acquire_lease("r1", 1, "owner-a", ttl).await.unwrap();

        assert!(!coordinator.release_lease("r1", 1, "owner-b").await.unwrap());
        assert!(coordinator.release_lease("r1", 1, "owner-a").await.unwrap());
        assert!(coordinator.acquire_lease("r1", 1, "owner-b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_can_be_reacquired_by_another_owner() {
        let coordinator = InMemoryCoordinator::new();
        let ttl = Duration::from_millis(10);
        coordinator.acquire_lease("r1", 1, "owner-a", ttl).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(coordinator.acquire_lease("r1", 1, "owner-b", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_marker_round_trips() {
        let coordinator = InMemoryCoordinator::new();
        assert!(!coordinator.is_cancel_requested("r1", 1).await.unwrap());

        coordinator.request_cancel("r1", 1, Duration::from_secs(30)).await.unwrap();
        assert!(coordinator.is_cancel_requested("r1", 1).await.unwrap());

        coordinator.clear_cancel("r1", 1).await.unwrap();
        assert!(!coordinator.is_cancel_requested("r1", 1).await.unwrap());
    }

    #[tokio::test]
    async fn subscriber_receives_events_published_after_it_subscribed() {
        let coordinator = InMemoryCoordinator::new();
        let mut sub = coordinator.subscribe_live_events("r1").await.unwrap();

        coordinator.publish_live_event("r1", "hello".to_string()).await.unwrap();

        let received = sub.read_live_event(Duration::from_millis(100)).await.unwrap();
        assert_eq!(received, Some("hello".to_string()));
    }
}
