//! Redis override backend.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};

use super::OverrideBackend;
use crate::error::StoreError;

/// Stores payloads as plain string values, using `SET EX` when a TTL is
/// given.
#[derive(Clone)]
pub struct RedisOverrideBackend {
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisOverrideBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisOverrideBackend").finish_non_exhaustive()
    }
}

impl RedisOverrideBackend {
    /// Opens a multiplexed connection to `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        tracing::info!("Connected to Redis override backend");
        Ok(Self { conn })
    }
}

#[async_trait]
impl OverrideBackend for RedisOverrideBackend {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        // Multiplexed connections are cheap to clone and pipeline concurrently.
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        match ttl.map(|t| t.as_secs()).filter(|secs| *secs > 0) {
            Some(secs) => conn.set_ex::<&str, &str, ()>(key, value, secs).await?,
            None => conn.set::<&str, &str, ()>(key, value).await?,
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
