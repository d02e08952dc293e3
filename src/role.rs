//! The structural contract shared by the scheduler and executor loops
//! (§9: "role polymorphism" — {start, stop, is_running}), plus the
//! cooperative stop signal each loop's suspension points wait on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

/// A stop flag paired with a `Notify` so a sleeping loop wakes immediately
/// when told to stop, rather than waiting out its full interval.
#[derive(Clone)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopToken {
    pub fn new() -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early if [`StopToken::stop`] is called.
    pub async fn sleep_or_wake(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.notify.notified() => {}
        }
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The capability the supervisor holds exactly one of at a time: a running
/// scheduler or executor loop that can be asked to stop and polled for
/// whether it has.
#[async_trait]
pub trait RoleLoop: Send + Sync {
    async fn run(self: Arc<Self>);
    fn request_stop(&self);
    fn is_running(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn sleep_or_wake_returns_early_on_stop() {
        let token = StopToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            let start = Instant::now();
            waiter.sleep_or_wake(Duration::from_secs(30)).await;
            start.elapsed()
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.stop();
        let elapsed = handle.await.unwrap();
        assert!(elapsed < Duration::from_secs(1));
        assert!(token.is_stopped());
    }
}
