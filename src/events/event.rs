//! # Runtime events emitted by the supervisor and the orchestrator.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Service lifecycle**: starting, ready, unhealthy, error, exit, stopping, stopped, restarting
//! - **Output**: one event per line captured from a child's stdout/stderr
//! - **Environment**: phases, warnings, critical failures, startup and shutdown
//! - **Subscriber diagnostics**: overflow and panics inside subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the service key,
//! reasons, exit codes and output lines.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Output lines of one stream of one service are published in the order they were read.
//!
//! ## Example
//! ```rust
//! use stackvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ServiceExit)
//!     .with_service("api")
//!     .with_exit(Some(1), None);
//!
//! assert_eq!(ev.kind, EventKind::ServiceExit);
//! assert_eq!(ev.service.as_deref(), Some("api"));
//! assert_eq!(ev.exit_code, Some(1));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Output stream of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputStream::Stdout => f.write_str("stdout"),
            OutputStream::Stderr => f.write_str("stderr"),
        }
    }
}

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `service`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `service`: subscriber name
    /// - `reason`: "full" or "closed"
    SubscriberOverflow,

    // === Service lifecycle ===
    /// A process is about to be spawned.
    ///
    /// Sets:
    /// - `service`: service key
    /// - `attempt`: restart counter of this instance (0 for the first launch)
    ServiceStarting,

    /// The service passed its health probe (or settle delay).
    ///
    /// Sets:
    /// - `service`: service key
    ServiceReady,

    /// The health probe did not succeed within the timeout.
    ///
    /// Sets:
    /// - `service`: service key
    /// - `reason`: probe target and timeout
    ServiceUnhealthy,

    /// Spawn, startup or restart failure.
    ///
    /// Sets:
    /// - `service`: service key
    /// - `reason`: error message
    ServiceError,

    /// The process exited without being asked to.
    ///
    /// Sets:
    /// - `service`: service key
    /// - `exit_code`: exit status code, if any
    /// - `signal`: terminating signal, if any
    ServiceExit,

    /// Graceful termination was requested.
    ///
    /// Sets:
    /// - `service`: service key
    /// - `delay_ms`: grace period before the forceful signal
    ServiceStopping,

    /// The process exited after a requested stop and its record was removed.
    ///
    /// Sets:
    /// - `service`: service key
    /// - `exit_code` / `signal`: final status
    ServiceStopped,

    /// An automatic restart was scheduled.
    ///
    /// Sets:
    /// - `service`: service key
    /// - `attempt`: restart number (1-based)
    /// - `delay_ms`: backoff before the new launch
    ServiceRestarting,

    /// A post-start hook returned an error.
    ///
    /// Sets:
    /// - `service`: service key
    /// - `reason`: hook error
    HookFailed,

    /// One line of child output.
    ///
    /// Sets:
    /// - `service`: service key
    /// - `stream`: stdout or stderr
    /// - `line`: the line without its terminator
    OutputLine,

    // === Environment ===
    /// A required service failed and can no longer be recovered.
    ///
    /// Sets:
    /// - `service`: service key
    /// - `reason`: last failure
    CriticalServiceFailed,

    /// A startup phase began.
    ///
    /// Sets:
    /// - `phase`: phase name
    PhaseStarted,

    /// A startup phase finished (possibly degraded).
    ///
    /// Sets:
    /// - `phase`: phase name
    PhaseCompleted,

    /// A required phase failed.
    ///
    /// Sets:
    /// - `phase`: phase name
    /// - `service`: failing service key
    /// - `reason`: error message
    PhaseFailed,

    /// A non-fatal problem (optional service/phase/check failed).
    ///
    /// Sets:
    /// - `service`: affected key or check name, if any
    /// - `reason`: description
    Warning,

    /// All phases finished and the environment is running.
    StartupComplete,

    /// Environment shutdown began.
    ShutdownStarted,

    /// Environment shutdown finished.
    ShutdownComplete,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Service key (or subscriber/check name for diagnostics).
    pub service: Option<Arc<str>>,
    /// Human-readable reason (errors, warnings, overflow details).
    pub reason: Option<Arc<str>>,
    /// Phase name.
    pub phase: Option<Arc<str>>,
    /// Exit code of a finished process.
    pub exit_code: Option<i32>,
    /// Signal that terminated a process.
    pub signal: Option<i32>,
    /// Stream of an output line.
    pub stream: Option<OutputStream>,
    /// Captured output line.
    pub line: Option<Arc<str>>,
    /// Attempt/restart counter.
    pub attempt: Option<u32>,
    /// Delay (backoff or grace) in milliseconds.
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            reason: None,
            phase: None,
            exit_code: None,
            signal: None,
            stream: None,
            line: None,
            attempt: None,
            delay_ms: None,
        }
    }

    /// Attaches a service key.
    #[inline]
    pub fn with_service(mut self, key: impl Into<Arc<str>>) -> Self {
        self.service = Some(key.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a phase name.
    #[inline]
    pub fn with_phase(mut self, phase: impl Into<Arc<str>>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Attaches exit code and terminating signal.
    #[inline]
    pub fn with_exit(mut self, code: Option<i32>, signal: Option<i32>) -> Self {
        self.exit_code = code;
        self.signal = signal;
        self
    }

    /// Attaches one output line and its stream.
    #[inline]
    pub fn with_output(mut self, stream: OutputStream, line: impl Into<Arc<str>>) -> Self {
        self.stream = Some(stream);
        self.line = Some(line.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_reason(info)
    }

    /// Creates a warning event.
    #[inline]
    pub fn warning(subject: Option<&str>, reason: impl Into<Arc<str>>) -> Self {
        let ev = Event::new(EventKind::Warning).with_reason(reason);
        match subject {
            Some(s) => ev.with_service(s),
            None => ev,
        }
    }

    /// True if this event concerns the given service key.
    #[inline]
    pub fn is_for(&self, key: &str) -> bool {
        self.service.as_deref() == Some(key)
    }
}
