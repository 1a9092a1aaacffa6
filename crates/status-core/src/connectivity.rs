//! Connectivity flag shared with health checks

use std::time::Duration;

use tokio::sync::watch;

/// Writer side, owned by the engine.
#[derive(Debug)]
pub struct ConnectivityFlag {
    tx: watch::Sender<bool>,
}

impl ConnectivityFlag {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn set(&self, connected: bool) {
        // send_if_modified keeps observers from waking on no-op writes
        self.tx.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        });
    }

    pub fn get(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn observer(&self) -> ConnectivityObserver {
        ConnectivityObserver {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the engine's connectivity, cheap to clone.
#[derive(Debug, Clone)]
pub struct ConnectivityObserver {
    rx: watch::Receiver<bool>,
}

impl ConnectivityObserver {
    pub fn is_connected(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the PBX reports itself booted, up to `timeout`.
    ///
    /// Returns `false` on timeout or if the engine went away.
    pub async fn wait_connected(&mut self, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, self.rx.wait_for(|connected| *connected)).await,
            Ok(Ok(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_observer_sees_updates() {
        let flag = ConnectivityFlag::new();
        let mut observer = flag.observer();
        assert!(!observer.is_connected());

        flag.set(true);
        assert!(observer.is_connected());
        assert!(observer.wait_connected(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() {
        let flag = ConnectivityFlag::new();
        let mut observer = flag.observer();

        assert!(!observer.wait_connected(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_connect() {
        let flag = ConnectivityFlag::new();
        let mut observer = flag.observer();

        let waiter = tokio::spawn(async move { observer.wait_connected(Duration::from_secs(5)).await });
        tokio::task::yield_now().await;
        flag.set(true);

        assert!(waiter.await.unwrap());
    }
}
