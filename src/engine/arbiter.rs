//! Access arbiter
//!
//! One resource-using operation in flight at a time, across every family.
//! Model weights share device memory, so there is a single global lock
//! rather than one per family. Waiters are not timed out.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{GatewayError, Result};

/// Counters describing arbiter usage
#[derive(Debug, Default)]
pub struct ArbiterStats {
    acquisitions: AtomicU64,
    releases: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Point-in-time copy of `ArbiterStats`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterSnapshot {
    pub acquisitions: u64,
    pub releases: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

/// Global mutual-exclusion gate over the shared device
#[derive(Clone, Default)]
pub struct Arbiter {
    lock: Arc<Mutex<()>>,
    stats: Arc<ArbiterStats>,
}

/// Exclusive permit on the shared device, released on drop
pub struct AccessToken {
    _guard: OwnedMutexGuard<()>,
    stats: Arc<ArbiterStats>,
}

impl Drop for AccessToken {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the device is free
    pub async fn acquire(&self) -> AccessToken {
        let guard = Arc::clone(&self.lock).lock_owned().await;
        self.stats.acquisitions.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        AccessToken {
            _guard: guard,
            stats: Arc::clone(&self.stats),
        }
    }

    /// Run a blocking model call while holding the device
    ///
    /// The token moves into the blocking task, so it is released when the
    /// call finishes even if the awaiting request has gone away.
    pub async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let token = self.acquire().await;
        let joined = tokio::task::spawn_blocking(move || {
            let _token = token;
            f()
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(GatewayError::Inference(anyhow!("model call panicked"))),
            Err(e) => Err(GatewayError::Inference(anyhow!("model call aborted: {}", e))),
        }
    }

    pub fn stats(&self) -> ArbiterSnapshot {
        ArbiterSnapshot {
            acquisitions: self.stats.acquisitions.load(Ordering::SeqCst),
            releases: self.stats.releases.load(Ordering::SeqCst),
            in_flight: self.stats.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.stats.peak_in_flight.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_release_on_success_and_failure() {
        let arbiter = Arbiter::new();

        let ok = arbiter.run(|| Ok(42)).await.unwrap();
        assert_eq!(ok, 42);

        let err = arbiter
            .run(|| -> Result<()> { Err(GatewayError::inference(anyhow!("boom"))) })
            .await;
        assert!(matches!(err, Err(GatewayError::Inference(_))));

        let stats = arbiter.stats();
        assert_eq!(stats.acquisitions, 2);
        assert_eq!(stats.releases, 2);
        assert_eq!(stats.in_flight, 0);
    }

    #[tokio::test]
    async fn test_release_on_panic() {
        let arbiter = Arbiter::new();
        let result = arbiter.run(|| -> Result<()> { panic!("kernel fault") }).await;
        assert!(matches!(result, Err(GatewayError::Inference(_))));

        let stats = arbiter.stats();
        assert_eq!(stats.acquisitions, stats.releases);

        // Still usable afterwards
        assert_eq!(arbiter.run(|| Ok(1)).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_one_in_flight() {
        let arbiter = Arbiter::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let arbiter = arbiter.clone();
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    arbiter
                        .run(move || {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(5));
                            active.fetch_sub(1, Ordering::SeqCst);
                            if i % 3 == 0 {
                                Err(GatewayError::inference(anyhow!("injected")))
                            } else {
                                Ok(())
                            }
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            let _ = task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        let stats = arbiter.stats();
        assert_eq!(stats.acquisitions, 16);
        assert_eq!(stats.releases, 16);
        assert_eq!(stats.peak_in_flight, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_waiter_keeps_lock_until_call_completes() {
        let arbiter = Arbiter::new();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let (finish_tx, finish_rx) = std::sync::mpsc::channel::<()>();

        let running = {
            let arbiter = arbiter.clone();
            tokio::spawn(async move {
                arbiter
                    .run(move || {
                        let _ = started_tx.send(());
                        let _ = finish_rx.recv();
                        Ok(())
                    })
                    .await
            })
        };
        started_rx.await.unwrap();

        // The request goes away, the model call does not.
        running.abort();
        let _ = running.await;
        assert_eq!(arbiter.stats().in_flight, 1);

        finish_tx.send(()).unwrap();
        let _token = arbiter.acquire().await;
        let stats = arbiter.stats();
        assert_eq!(stats.acquisitions, 2);
        assert_eq!(stats.releases, 1);
    }
}
