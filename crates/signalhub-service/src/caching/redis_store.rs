//! The remote cache tier backed by a Redis-compatible server.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::{Cmd, FromRedisValue};

use super::{CacheError, CacheKey, CacheStore, RemoteCacheConfig};

/// A [`CacheStore`] talking to Redis over a multiplexed async connection.
///
/// The connection is established lazily on first use and re-established after it broke, so a
/// server that is down during startup does not prevent the service from starting.
pub struct RedisStore {
    client: redis::Client,
    connection: tokio::sync::Mutex<Option<MultiplexedConnection>>,
    op_timeout: Duration,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Creates the store. This only validates the URL, it does not connect yet.
    pub fn open(config: &RemoteCacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.url.as_str())?;
        Ok(Self {
            client,
            connection: Default::default(),
            op_timeout: config.op_timeout,
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.as_ref() {
            return Ok(connection.clone());
        }

        let connect = self.client.get_multiplexed_async_connection();
        let connection = tokio::time::timeout(self.op_timeout, connect)
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout))??;
        tracing::debug!("Connected to remote cache");
        *slot = Some(connection.clone());
        Ok(connection)
    }

    async fn reset_connection(&self) {
        self.connection.lock().await.take();
    }

    async fn run<T: FromRedisValue>(&self, cmd: Cmd) -> Result<T, CacheError> {
        let mut connection = self.connection().await?;
        let result = tokio::time::timeout(self.op_timeout, cmd.query_async(&mut connection)).await;
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
                    self.reset_connection().await;
                }
                Err(err.into())
            }
            Err(_) => {
                self.reset_connection().await;
                Err(CacheError::Timeout(self.op_timeout))
            }
        }
    }
}

/// Redis expiries have a granularity of seconds, round up so entries never expire early.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl CacheStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key.storage_key());
        let value: Option<Vec<u8>> = self.run(cmd).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key.storage_key())
            .arg(value.as_ref())
            .arg("EX")
            .arg(ttl_secs(ttl));
        self.run::<()>(cmd).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key.storage_key());
        self.run::<()>(cmd).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.run::<()>(redis::cmd("FLUSHALL")).await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let pong: String = self.run(redis::cmd("PING")).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheError::Malformed(format!("unexpected PING reply: {pong}")))
        }
    }
}
