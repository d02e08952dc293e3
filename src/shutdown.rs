//! Process-wide graceful shutdown, built on a `tokio::sync::watch` channel.
//!
//! Grounded on the teacher's own `server::shutdown` module: a single
//! controller triggers shutdown once, and every background task holds a
//! cheaply-cloned signal it can await.

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once [`ShutdownController::shutdown`] has been called.
    /// Safe to call repeatedly from a `select!` loop.
    pub async fn wait(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }
}

pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownController { tx }, ShutdownSignal { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_resolves_after_shutdown_is_called() {
        let (controller, mut signal) = shutdown_channel();
        assert!(!signal.is_shutdown());

        let waiter = tokio::spawn(async move {
            signal.wait().await;
            signal.is_shutdown()
        });

        controller.shutdown();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn wait_returns_immediately_if_already_shut_down() {
        let (controller, mut signal) = shutdown_channel();
        controller.shutdown();
        tokio::time::timeout(std::time::Duration::from_millis(50), signal.wait())
            .await
            .expect("wait() should not block once already shut down");
    }
}
