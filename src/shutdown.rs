//! Broadcast-once cancellation token.
//!
//! One `Shutdown` is created per server and cloned into the accept loop, every
//! sender loop, and every handler. Sessions also carry their own token so a
//! single connection can be torn down without touching the others.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal.
    ///
    /// Returns `true` only for the call that moved the token from idle to
    /// fired; later calls are no-ops and return `false`.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Non-blocking check.
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn fired(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed
        // channel.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fire_once() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_fired());

        assert!(shutdown.fire());
        assert!(shutdown.is_fired());

        // Second fire has no further effect
        assert!(!shutdown.fire());
        assert!(shutdown.is_fired());
    }

    #[test]
    fn test_clones_share_state() {
        let shutdown = Shutdown::new();
        let clone = shutdown.clone();

        clone.fire();
        assert!(shutdown.is_fired());
    }

    #[tokio::test]
    async fn test_fired_wakes_waiters() {
        let shutdown = Shutdown::new();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let shutdown = shutdown.clone();
                tokio::spawn(async move { shutdown.fired().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.fire();

        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("waiter not woken")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_fired_after_fire_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.fire();

        tokio::time::timeout(Duration::from_millis(100), shutdown.fired())
            .await
            .expect("already-fired token should not block");
    }

    #[test]
    fn test_concurrent_fire_single_winner() {
        let shutdown = Shutdown::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shutdown = shutdown.clone();
                std::thread::spawn(move || shutdown.fire())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
    }
}
