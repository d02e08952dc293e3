//! In-memory stand-in for [`Store`], used by the coordination-plane test
//! suite so property and scenario tests (§8) run deterministically without a
//! live Redis instance. Grounded on the pack's `MockRedisClient` pattern.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{Store, StoreError};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    kv: HashMap<String, Entry>,
    queues: HashMap<String, VecDeque<String>>,
}

/// An in-memory coordination store. Cloning shares the same backing state
/// (all clones observe the same keys and queues), matching the production
/// store's semantics of a single process-wide connection shared by reference.
#[derive(Clone, Default)]
pub struct FakeStore {
    inner: std::sync::Arc<Mutex<Inner>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn expired(entry: &Entry, now: Instant) -> bool {
        match entry.expires_at {
            Some(exp) => now > exp,
            None => false,
        }
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn try_claim(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let occupied = inner
            .kv
            .get(key)
            .is_some_and(|e| !Self::expired(e, now));
        if occupied {
            return Ok(false);
        }
        inner.kv.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        inner.kv.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.kv.get(key) {
            if Self::expired(entry, now) {
                inner.kv.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.value.clone()));
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.lock().await.kv.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.kv.get_mut(key) {
            entry.expires_at = Some(now + ttl);
        }
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let current = inner
            .kv
            .get(key)
            .filter(|e| !Self::expired(e, now))
            .and_then(|e| e.value.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        inner.kv.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn scan_prefix(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let prefix = pattern.trim_end_matches('*');
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let expired_keys: Vec<String> = inner
            .kv
            .iter()
            .filter(|(_, e)| Self::expired(e, now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired_keys {
            inner.kv.remove(&k);
        }
        Ok(inner
            .kv
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn push_back(&self, key: &str, items: &[String]) -> Result<i64, StoreError> {
        let mut inner = self.inner.lock().await;
        let queue = inner.queues.entry(key.to_string()).or_default();
        queue.extend(items.iter().cloned());
        Ok(queue.len() as i64)
    }

    async fn pop_front_blocking(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(queue) = inner.queues.get_mut(key) {
                    if let Some(item) = queue.pop_front() {
                        return Ok(Some((key.to_string(), item)));
                    }
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
