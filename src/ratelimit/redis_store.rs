//! Redis-backed counter store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use super::store::{CounterStore, StoreError};

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Counter store backed by a Redis server.
///
/// Each increment is sent as `MULTI / INCR / EXPIREAT / EXEC`, so the count
/// and its expiry commit together. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    ///
    /// `timeout` bounds the initial connection and every later round trip.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;

        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(timeout))??;

        info!(timeout_ms = timeout.as_millis() as u64, "Connected to Redis counter store");

        Ok(Self { conn, timeout })
    }
}

/// `MULTI / INCR key / EXPIREAT key ts / EXEC`, with the EXPIREAT reply
/// dropped so the pipeline yields just the new count.
fn increment_pipeline(key: &str, expire_at: u64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("INCR")
        .arg(key)
        .cmd("EXPIREAT")
        .arg(key)
        .arg(expire_at)
        .ignore();
    pipe
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment_and_expire(&self, key: &str, expire_at: u64) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let pipe = increment_pipeline(key, expire_at);

        let result: redis::RedisResult<(u64,)> =
            tokio::time::timeout(self.timeout, pipe.query_async(&mut conn))
                .await
                .map_err(|_| StoreError::Timeout(self.timeout))?;
        let (count,) = result?;

        debug!(key, count, expire_at, "Redis counter incremented");
        Ok(count)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<String> =
            tokio::time::timeout(self.timeout, redis::cmd("PING").query_async(&mut conn))
                .await
                .map_err(|_| StoreError::Timeout(self.timeout))?;
        result?;
        Ok(())
    }
}
