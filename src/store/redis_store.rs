//! Redis-backed implementation of [`Store`] (§4.1, §10.5).
//!
//! Construction retries with a bounded attempt count; any subsequent
//! primitive that fails with a connection error transparently reconnects
//! once before surfacing the error to the caller.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Store, StoreError};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub connect_retries: u32,
    pub connect_retry_delay: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_retries: 5,
            connect_retry_delay: Duration::from_secs(2),
        }
    }
}

pub struct CoordinationStore {
    client: redis::Client,
    conn: Mutex<redis::aio::MultiplexedConnection>,
}

impl CoordinationStore {
    /// Connect with a bounded retry, matching the original Redis client's
    /// `_connect` loop: `connect_retries` attempts, `connect_retry_delay`
    /// between them. Fatal (kind 5) after the last attempt fails.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let mut last_err = None;
        for attempt in 1..=config.connect_retries.max(1) {
            match client.get_multiplexed_tokio_connection().await {
                Ok(conn) => {
                    debug!(attempt, "connected to coordination store");
                    return Ok(Self {
                        client,
                        conn: Mutex::new(conn),
                    });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = config.connect_retries,
                        error = %e,
                        "coordination store connection attempt failed"
                    );
                    last_err = Some(e);
                    if attempt < config.connect_retries {
                        tokio::time::sleep(config.connect_retry_delay).await;
                    }
                }
            }
        }
        Err(StoreError::Connection(
            last_err.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        let fresh = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        *self.conn.lock().await = fresh;
        Ok(())
    }

    /// Run `op` against the cached connection; on a connection-shaped error,
    /// reconnect once and retry before surfacing the error.
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: Fn(redis::aio::MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.conn.lock().await.clone();
        match op(conn).await {
            Ok(v) => Ok(v),
            Err(e) if e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() => {
                warn!(error = %e, "coordination store connection lost, reconnecting");
                self.reconnect().await?;
                let conn = self.conn.lock().await.clone();
                op(conn)
                    .await
                    .map_err(|e| StoreError::Command(e.to_string()))
            }
            Err(e) => Err(StoreError::Command(e.to_string())),
        }
    }
}

#[async_trait]
impl Store for CoordinationStore {
    async fn try_claim(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        let ttl_secs = ttl.as_secs();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            let value = value.clone();
            async move {
                let result: redis::RedisResult<Option<String>> = redis::cmd("SET")
                    .arg(&key)
                    .arg(&value)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl_secs)
                    .query_async(&mut conn)
                    .await;
                result.map(|v| v.is_some())
            }
        })
        .await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        let ttl_secs = ttl.as_secs();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            let value = value.clone();
            async move { conn.set_ex(&key, &value, ttl_secs).await }
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move { conn.get(&key).await }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move {
                let _: i64 = conn.del(&key).await?;
                Ok(())
            }
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let key = key.to_string();
        let ttl_secs = ttl.as_secs() as i64;
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move {
                let _: bool = conn.expire(&key, ttl_secs).await?;
                Ok(())
            }
        })
        .await
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let key = key.to_string();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move { conn.incr(&key, 1).await }
        })
        .await
    }

    async fn scan_prefix(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let pattern = pattern.to_string();
        self.with_retry(move |mut conn| {
            let pattern = pattern.clone();
            async move {
                let iter: redis::AsyncIter<String> = conn.scan_match(&pattern).await?;
                Ok(iter.collect().await)
            }
        })
        .await
    }

    async fn push_back(&self, key: &str, items: &[String]) -> Result<i64, StoreError> {
        if items.is_empty() {
            return Ok(0);
        }
        let key = key.to_string();
        let items = items.to_vec();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            let items = items.clone();
            async move { conn.rpush(&key, items).await }
        })
        .await
    }

    async fn pop_front_blocking(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError> {
        let key = key.to_string();
        // redis BLPOP takes a floating-point timeout in seconds; 0 means forever,
        // which the executor loop never wants, so callers always pass > 0.
        let timeout_secs = timeout.as_secs_f64();
        self.with_retry(move |mut conn| {
            let key = key.clone();
            async move {
                let result: Option<(String, String)> = redis::cmd("BLPOP")
                    .arg(&key)
                    .arg(timeout_secs)
                    .query_async(&mut conn)
                    .await?;
                Ok(result)
            }
        })
        .await
    }
}
