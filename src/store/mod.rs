//! Coordination-store client: the only shared in-process resource.
//!
//! `Store` names the primitives every other component is built on
//! (conditional create, TTL refresh, scan, list push/pop). `CoordinationStore`
//! is the Redis-backed production implementation; `fake` provides an
//! in-memory stand-in used throughout the test suite.

mod fake;
mod keys;
mod redis_store;

pub use fake::FakeStore;
pub use keys::Keys;
pub use redis_store::{CoordinationStore, StoreConfig};

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("coordination store connection error: {0}")]
    Connection(String),
    #[error("coordination store command failed: {0}")]
    Command(String),
}

/// The seven primitives the coordination plane is built on, plus connection
/// management. All values are UTF-8 strings (§4.1: string encoding required).
#[async_trait]
pub trait Store: Send + Sync {
    /// Conditional-set-if-absent with TTL. Returns true iff newly written.
    async fn try_claim(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Unconditional set with TTL.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Extend an existing key's TTL without touching its value.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn incr(&self, key: &str) -> Result<i64, StoreError>;

    /// Cursor-style prefix enumeration; never loads the full keyspace at once.
    async fn scan_prefix(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Append to the tail of a list in a single call (preserves intra-batch order).
    async fn push_back(&self, key: &str, items: &[String]) -> Result<i64, StoreError>;

    /// Blocking pop from the head of a list. `None` means the timeout elapsed.
    async fn pop_front_blocking(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError>;
}
