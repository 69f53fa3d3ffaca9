//! # Status model: per-process state machine and read-only snapshots.
//!
//! ```text
//!            probe ok / settle
//! Starting ─────────────────────► Healthy ──► Stopping ──► Stopped
//!    │  │                            │           ▲
//!    │  └─► Unhealthy ───────────────┼───────────┘
//!    │      (probe timeout)          │
//!    └──────────► Error ◄────────────┘ (spawn failure / unexpected exit)
//! ```
//!
//! `Stopping`, `Stopped` and `Error` are terminal for one process instance; a
//! restart creates a fresh record that begins at `Starting`.
//!
//! The supervisor never parks a tracked record in `Error`: a spawn failure
//! creates no record and an unexpected exit removes it. Those failures surface
//! as `ServiceError` / `ServiceExit` events and a returned [`ServiceError`]
//! instead. `Error` and its edges describe the instance for consumers that
//! rebuild per-service state from the event stream.
//!
//! [`ServiceError`]: crate::ServiceError

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Lifecycle state of one process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Starting,
    Healthy,
    Unhealthy,
    Stopping,
    Stopped,
    /// Failed instance; only derived from events, never held by a live record.
    Error,
}

impl ServiceState {
    /// Returns true if `self → next` is an edge of the process state machine.
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (Starting, Healthy)
                | (Starting, Unhealthy)
                | (Starting, Error)
                | (Starting, Stopping)
                | (Healthy, Stopping)
                | (Healthy, Error)
                | (Unhealthy, Stopping)
                | (Unhealthy, Error)
                | (Stopping, Stopped)
        )
    }

    /// True once the instance can no longer become ready.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ServiceState::Stopping | ServiceState::Stopped | ServiceState::Error
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Starting => "starting",
            ServiceState::Healthy => "healthy",
            ServiceState::Unhealthy => "unhealthy",
            ServiceState::Stopping => "stopping",
            ServiceState::Stopped => "stopped",
            ServiceState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Read-only snapshot of one tracked service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    /// Service key.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Current state.
    pub status: ServiceState,
    /// OS process id, if the process is alive.
    pub pid: Option<u32>,
    /// Wall-clock time the current instance was launched.
    pub started_at: SystemTime,
    /// Time since launch.
    pub uptime: Duration,
    /// Automatic restarts performed so far.
    pub restarts: u32,
}

/// Overall state of the development environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EnvironmentStatus::Stopped => "stopped",
            EnvironmentStatus::Starting => "starting",
            EnvironmentStatus::Running => "running",
            EnvironmentStatus::Stopping => "stopping",
            EnvironmentStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Aggregated snapshot returned by `Orchestrator::status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevServerState {
    /// Overall status.
    pub status: EnvironmentStatus,
    /// When the current (or last) `start()` began.
    pub started_at: Option<SystemTime>,
    /// Tracked services by key.
    pub services: BTreeMap<String, ServiceStatus>,
    /// Degraded-mode warnings collected during startup and supervision.
    pub warnings: Vec<String>,
}

impl DevServerState {
    /// Empty, stopped state.
    pub fn stopped() -> Self {
        Self {
            status: EnvironmentStatus::Stopped,
            started_at: None,
            services: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// True if every tracked service is healthy.
    pub fn all_healthy(&self) -> bool {
        self.services
            .values()
            .all(|s| s.status == ServiceState::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_do_not_advance() {
        for next in [
            ServiceState::Starting,
            ServiceState::Healthy,
            ServiceState::Unhealthy,
            ServiceState::Error,
        ] {
            assert!(!ServiceState::Stopped.can_transition_to(next));
            assert!(!ServiceState::Stopping.can_transition_to(next));
        }
        assert!(ServiceState::Stopping.can_transition_to(ServiceState::Stopped));
    }

    #[test]
    fn starting_edges() {
        assert!(ServiceState::Starting.can_transition_to(ServiceState::Healthy));
        assert!(ServiceState::Starting.can_transition_to(ServiceState::Unhealthy));
        assert!(ServiceState::Starting.can_transition_to(ServiceState::Error));
        assert!(!ServiceState::Healthy.can_transition_to(ServiceState::Starting));
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&EnvironmentStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
