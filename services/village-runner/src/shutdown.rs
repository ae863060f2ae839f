//! Cooperative stop signal shared between the engine and its controllers

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Requests a stop. Cheap to clone and safe to use from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes stop requests
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx: Arc::new(tx) }, StopSignal { rx })
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `duration` unless a stop arrives first.
    ///
    /// Returns `true` if the full duration elapsed without a stop request.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_stopped() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        // None: the sleep finished; Some(true): every handle was dropped
        let woken = tokio::select! {
            _ = tokio::time::sleep(duration) => None,
            res = self.rx.wait_for(|stopped| *stopped) => Some(res.is_err()),
        };
        match woken {
            None => !self.is_stopped(),
            Some(true) => {
                // nobody can stop us any more
                tokio::time::sleep(duration).await;
                true
            }
            Some(false) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_stop() {
        let (_handle, mut signal) = stop_channel();
        assert!(signal.sleep(Duration::from_secs(300)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_sleep() {
        let (handle, mut signal) = stop_channel();
        let started = tokio::time::Instant::now();

        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            stopper.stop();
        });

        assert!(!signal.sleep(Duration::from_secs(600)).await);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(handle.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_after_handles_dropped() {
        let (handle, mut signal) = stop_channel();
        drop(handle);
        let started = tokio::time::Instant::now();

        assert!(signal.sleep(Duration::from_secs(120)).await);
        assert!(started.elapsed() >= Duration::from_secs(120));
        assert!(!signal.is_stopped());
    }

    #[tokio::test]
    async fn test_sleep_after_stop_returns_immediately() {
        let (handle, mut signal) = stop_channel();
        handle.stop();
        assert!(!signal.sleep(Duration::from_secs(3600)).await);
    }
}
