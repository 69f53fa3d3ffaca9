//! # Health verifier: bounded readiness polling.
//!
//! ```text
//! wait_for_healthy(target, timeout, shutdown)
//!   loop {
//!     ├─► wait one interval        (cancellable by shutdown → Aborted)
//!     ├─► probe.check(target)      (bounded by the deadline)
//!     │     └─ true  → Ok(())
//!     └─► elapsed >= timeout       → Timeout
//!   }
//! ```
//!
//! The first probe happens one interval after the call: a process that was
//! just spawned is never ready at t=0.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::HealthError;
use crate::health::{HealthTarget, NetProbe, Probe};

/// Polls a [`Probe`] until it succeeds, times out, or shutdown begins.
#[derive(Clone)]
pub struct HealthVerifier {
    probe: Arc<dyn Probe>,
    interval: Duration,
}

impl HealthVerifier {
    /// Creates a verifier polling `probe` every `interval` (clamped to >= 1ms).
    pub fn new(probe: Arc<dyn Probe>, interval: Duration) -> Self {
        Self {
            probe,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Network-backed verifier with the given poll interval and per-attempt timeout.
    pub fn network(interval: Duration, attempt_timeout: Duration) -> Self {
        Self::new(Arc::new(NetProbe::new(attempt_timeout)), interval)
    }

    /// Poll interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One probe attempt; never fails, only reports `false`.
    pub async fn check(&self, target: &HealthTarget) -> bool {
        self.probe.check(target).await
    }

    /// Polls until healthy, failing with [`HealthError::Timeout`] once `timeout` has
    /// elapsed or [`HealthError::Aborted`] as soon as `shutdown` is cancelled.
    pub async fn wait_for_healthy(
        &self,
        target: &HealthTarget,
        timeout: Duration,
        shutdown: &CancellationToken,
    ) -> Result<(), HealthError> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut ticker = time::interval_at(start + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut polls: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(HealthError::Aborted),
                _ = ticker.tick() => {}
            }

            polls += 1;
            let healthy = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(HealthError::Aborted),
                res = time::timeout_at(deadline.max(Instant::now() + self.interval), self.probe.check(target)) => {
                    res.unwrap_or(false)
                }
            };

            if healthy {
                tracing::debug!(%target, polls, elapsed = ?start.elapsed(), "health probe succeeded");
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(HealthError::Timeout {
                    target: target.to_string(),
                    timeout,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Succeeds on the n-th call (never if `succeed_on == 0`).
    struct Scripted {
        calls: AtomicU32,
        succeed_on: u32,
    }

    impl Scripted {
        fn new(succeed_on: u32) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                succeed_on,
            })
        }
    }

    #[async_trait]
    impl Probe for Scripted {
        async fn check(&self, _target: &HealthTarget) -> bool {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.succeed_on != 0 && n >= self.succeed_on
        }
    }

    fn target() -> HealthTarget {
        HealthTarget::parse("tcp://localhost:27017").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_poll_after_three_intervals() {
        let probe = Scripted::new(3);
        let verifier = HealthVerifier::new(probe.clone(), Duration::from_secs(1));
        let start = Instant::now();

        verifier
            .wait_for_healthy(&target(), Duration::from_secs(30), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_probe_never_succeeds() {
        let probe = Scripted::new(0);
        let verifier = HealthVerifier::new(probe.clone(), Duration::from_secs(1));

        let err = verifier
            .wait_for_healthy(&target(), Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, HealthError::Timeout { .. }));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_aborts_promptly() {
        let probe = Scripted::new(0);
        let verifier = HealthVerifier::new(probe, Duration::from_secs(1));
        let token = CancellationToken::new();

        let t = token.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(2500)).await;
            t.cancel();
        });

        let start = Instant::now();
        let err = verifier
            .wait_for_healthy(&target(), Duration::from_secs(60), &token)
            .await
            .unwrap_err();
        assert_eq!(err, HealthError::Aborted);
        assert!(start.elapsed() < Duration::from_secs(3));
    }
}
