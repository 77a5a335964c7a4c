//! Redis-backed `Coordinator`.
//!
//! `refresh_lease` and `release_lease` are compare-and-mutate operations that must be atomic
//! with respect to other clients, so both are implemented as embedded Lua scripts run through
//! `EVAL` rather than as a `GET` followed by a conditional `EXPIRE`/`DEL` from this process.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::CoordinatorError;
use crate::keys::{live_event_channel, turn_cancel_key, turn_lease_key};
use crate::{Coordinator, LiveSubscription, Result};

const REFRESH_LEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("expire", KEYS[1], ARGV[2])
else
    return 0
end
"#;

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

pub struct RedisCoordinator {
    client: Client,
    connection: Mutex<ConnectionManager>,
    refresh_script: Script,
    release_script: Script,
}

impl RedisCoordinator {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let connection = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            connection: Mutex::new(connection),
            refresh_script: Script::new(REFRESH_LEASE_SCRIPT),
            release_script: Script::new(RELEASE_LEASE_SCRIPT),
        })
    }
}

#[async_trait]
impl Coordinator for RedisCoordinator {
    async fn acquire_lease(
        &self,
        run_id: &str,
        turn_seq: i64,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.connection.lock().await;
        let acquired: bool = redis::cmd("SET")
            .arg(turn_lease_key(run_id, turn_seq))
            .arg(owner)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, Option<String>>(&mut *conn)
            .await?
            .is_some();
        debug!(run_id, turn_seq, owner, acquired, "acquire_lease");
        Ok(acquired)
    }

    async fn refresh_lease(
        &self,
        run_id: &str,
        turn_seq: i64,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.connection.lock().await;
        let refreshed: i64 = self
            .refresh_script
            .key(turn_lease_key(run_id, turn_seq))
            .arg(owner)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut *conn)
            .await?;
        Ok(refreshed != 0)
    }

    async fn release_lease(&self, run_id: &str, turn_seq: i64, owner: &str) -> Result<bool> {
        let mut conn = self.connection.lock().await;
        let released: i64 = self
            .release_script
            .key(turn_lease_key(run_id, turn_seq))
            .arg(owner)
            .invoke_async(&mut *conn)
            .await?;
        Ok(released != 0)
    }

    async fn get_lease_owner(&self, run_id: &str, turn_seq: i64) -> Result<Option<String>> {
        let mut conn = self.connection.lock().await;
        let owner: Option<String> = conn.get(turn_lease_key(run_id, turn_seq)).await?;
        Ok(owner)
    }

    async fn request_cancel(&self, run_id: &str, turn_seq: i64, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.lock().await;
        let _: () = conn
            .set_ex(turn_cancel_key(run_id, turn_seq), "1", ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn is_cancel_requested(&self, run_id: &str, turn_seq: i64) -> Result<bool> {
        let mut conn = self.connection.lock().await;
        let exists: bool = conn.exists(turn_cancel_key(run_id, turn_seq)).await?;
        Ok(exists)
    }

    async fn clear_cancel(&self, run_id: &str, turn_seq: i64) -> Result<()> {
        let mut conn = self.connection.lock().await;
        let _: () = conn.del(turn_cancel_key(run_id, turn_seq)).await?;
        Ok(())
    }

    async fn publish_live_event(&self, run_id: &str, payload: String) -> Result<()> {
        let mut conn = self.connection.lock().await;
        let _: i64 = conn.publish(live_event_channel(run_id), payload).await?;
        Ok(())
    }

    async fn subscribe_live_events(&self, run_id: &str) -> Result<Box<dyn LiveSubscription>> {
        let pubsub = self.client.get_async_connection().await?.into_pubsub();
        let channel = live_event_channel(run_id);
        let mut pubsub = pubsub;
        pubsub.subscribe(&channel).await?;
        Ok(Box::new(RedisLiveSubscription { pubsub, channel }))
    }
}

/// Holds a dedicated pubsub connection, so dropping it closes the connection and the
/// subscription with it — there is no separate unsubscribe step to forget.
struct RedisLiveSubscription {
    pubsub: redis::aio::PubSub,
    #[allow(dead_code)]
    channel: String,
}

#[async_trait]
impl LiveSubscription for RedisLiveSubscription {
    async fn read_live_event(&mut self, timeout: Duration) -> Result<Option<String>> {
        let mut stream = self.pubsub.on_message();
        match tokio::time::timeout(timeout, futures::StreamExt::next(&mut stream)).await {
            Ok(Some(msg)) => Ok(Some(msg.get_payload::<String>().map_err(CoordinatorError::from)?)),
            Ok(None) => Ok(None),
            Err(_elapsed) => Ok(None),
        }
    }
}
