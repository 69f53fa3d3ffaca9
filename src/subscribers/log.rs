//! # LogWriter: renders events through `tracing`
//!
//! A subscriber that turns every [`Event`] into a structured `tracing` record.
//! Child output goes out at `info` under the `stackvisor::output` target so it can
//! be filtered separately from lifecycle records.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO stackvisor::lifecycle: starting service="db" restarts=0
//! INFO stackvisor::output: service="db" stream=stdout waiting for connections
//! INFO stackvisor::lifecycle: ready service="db"
//! WARN stackvisor::lifecycle: unexpected exit service="api" code=Some(1) signal=None
//! INFO stackvisor::lifecycle: restarting service="api" restart=1 delay_ms=2000
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::OutputLine => {
                let stream = e.stream.map(|s| s.to_string()).unwrap_or_default();
                let line = e.line.as_deref().unwrap_or("");
                tracing::info!(target: "stackvisor::output", service, %stream, "{line}");
            }
            EventKind::ServiceStarting => {
                tracing::info!(target: "stackvisor::lifecycle", service, restarts = e.attempt, "starting");
            }
            EventKind::ServiceReady => {
                tracing::info!(target: "stackvisor::lifecycle", service, "ready");
            }
            EventKind::ServiceUnhealthy => {
                tracing::warn!(target: "stackvisor::lifecycle", service, reason, "unhealthy");
            }
            EventKind::ServiceError => {
                tracing::error!(target: "stackvisor::lifecycle", service, reason, "error");
            }
            EventKind::ServiceExit => {
                tracing::warn!(
                    target: "stackvisor::lifecycle",
                    service,
                    code = ?e.exit_code,
                    signal = ?e.signal,
                    "unexpected exit"
                );
            }
            EventKind::ServiceStopping => {
                tracing::info!(target: "stackvisor::lifecycle", service, grace_ms = e.delay_ms, "stopping");
            }
            EventKind::ServiceStopped => {
                tracing::info!(target: "stackvisor::lifecycle", service, code = ?e.exit_code, "stopped");
            }
            EventKind::ServiceRestarting => {
                tracing::info!(
                    target: "stackvisor::lifecycle",
                    service,
                    restart = e.attempt,
                    delay_ms = e.delay_ms,
                    "restarting"
                );
            }
            EventKind::HookFailed => {
                tracing::warn!(target: "stackvisor::lifecycle", service, reason, "post-start hook failed");
            }
            EventKind::CriticalServiceFailed => {
                tracing::error!(target: "stackvisor::lifecycle", service, reason, "critical service failed");
            }
            EventKind::PhaseStarted => {
                tracing::info!(target: "stackvisor::lifecycle", phase = e.phase.as_deref(), "phase started");
            }
            EventKind::PhaseCompleted => {
                tracing::info!(target: "stackvisor::lifecycle", phase = e.phase.as_deref(), "phase completed");
            }
            EventKind::PhaseFailed => {
                tracing::error!(
                    target: "stackvisor::lifecycle",
                    phase = e.phase.as_deref(),
                    service,
                    reason,
                    "phase failed"
                );
            }
            EventKind::Warning => {
                tracing::warn!(target: "stackvisor::lifecycle", subject = service, "{reason}");
            }
            EventKind::StartupComplete => {
                tracing::info!(target: "stackvisor::lifecycle", "environment running");
            }
            EventKind::ShutdownStarted => {
                tracing::info!(target: "stackvisor::lifecycle", "shutdown started");
            }
            EventKind::ShutdownComplete => {
                tracing::info!(target: "stackvisor::lifecycle", "shutdown complete");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "stackvisor::lifecycle", subscriber = service, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: "stackvisor::lifecycle", subscriber = service, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }

    fn queue_capacity(&self) -> usize {
        4096
    }
}
