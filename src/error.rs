//! Error types used by the stackvisor runtime.
//!
//! This module defines three error enums:
//!
//! - [`ServiceError`]: failures of a single managed service (spawn, health, restart).
//! - [`HealthError`]: outcome of a bounded health wait, before a service key is attached.
//! - [`OrchestratorError`]: failures of the environment as a whole.
//!
//! All of them provide `as_label` for logs/metrics; service-scoped errors also
//! expose the key of the failing service via `service()`.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced while managing one service.
///
/// Every variant carries the service key and a human-readable cause.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A process record already exists for this key.
    #[error("service '{key}' is already running")]
    ServiceAlreadyRunning {
        /// Service key.
        key: String,
    },

    /// No process record exists for this key.
    #[error("service '{key}' is not running")]
    ServiceNotRunning {
        /// Service key.
        key: String,
    },

    /// The OS refused to launch the process.
    #[error("failed to spawn '{key}' ({program}): {source}")]
    ProcessSpawn {
        /// Service key.
        key: String,
        /// Executable that was launched.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The health probe never succeeded within the configured timeout.
    #[error("service '{key}' did not become healthy at {target} within {timeout:?}")]
    HealthCheckTimeout {
        /// Service key.
        key: String,
        /// Probe target (URL or host:port).
        target: String,
        /// Configured probe timeout.
        timeout: Duration,
    },

    /// A wait was abandoned because a global shutdown started.
    #[error("startup of '{key}' aborted: shutdown in progress")]
    AbortedDuringShutdown {
        /// Service key.
        key: String,
    },

    /// A required service failed and could not be restarted.
    #[error("critical service '{key}' failed: {reason}")]
    CriticalServiceFailure {
        /// Service key.
        key: String,
        /// Last observed failure.
        reason: String,
    },

    /// The process exited before it became ready.
    #[error("service '{key}' exited during startup ({status})")]
    ProcessExited {
        /// Service key.
        key: String,
        /// Rendered exit status.
        status: String,
    },

    /// The declared health target cannot be parsed.
    #[error("service '{key}' declares an invalid health target '{target}': {reason}")]
    InvalidHealthTarget {
        /// Service key.
        key: String,
        /// Raw target string.
        target: String,
        /// Parse failure.
        reason: String,
    },
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stackvisor::ServiceError;
    ///
    /// let err = ServiceError::ServiceNotRunning { key: "api".into() };
    /// assert_eq!(err.as_label(), "service_not_running");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::ServiceAlreadyRunning { .. } => "service_already_running",
            ServiceError::ServiceNotRunning { .. } => "service_not_running",
            ServiceError::ProcessSpawn { .. } => "process_spawn_error",
            ServiceError::HealthCheckTimeout { .. } => "health_check_timeout",
            ServiceError::AbortedDuringShutdown { .. } => "aborted_during_shutdown",
            ServiceError::CriticalServiceFailure { .. } => "critical_service_failure",
            ServiceError::ProcessExited { .. } => "process_exited",
            ServiceError::InvalidHealthTarget { .. } => "invalid_health_target",
        }
    }

    /// Key of the service this error refers to.
    pub fn service(&self) -> &str {
        match self {
            ServiceError::ServiceAlreadyRunning { key }
            | ServiceError::ServiceNotRunning { key }
            | ServiceError::ProcessSpawn { key, .. }
            | ServiceError::HealthCheckTimeout { key, .. }
            | ServiceError::AbortedDuringShutdown { key }
            | ServiceError::CriticalServiceFailure { key, .. }
            | ServiceError::ProcessExited { key, .. }
            | ServiceError::InvalidHealthTarget { key, .. } => key,
        }
    }

    /// True for failures caused by the shutdown protocol rather than the service.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ServiceError::AbortedDuringShutdown { .. })
    }
}

/// # Outcome of a bounded health wait.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    /// No successful probe before the deadline.
    #[error("health check for {target} timed out after {timeout:?}")]
    Timeout {
        /// Probe target.
        target: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// Shutdown was signaled while polling.
    #[error("health check aborted: shutdown in progress")]
    Aborted,
}

impl HealthError {
    /// Attaches the service key, producing the matching [`ServiceError`].
    pub fn for_service(self, key: &str) -> ServiceError {
        match self {
            HealthError::Timeout { target, timeout } => ServiceError::HealthCheckTimeout {
                key: key.to_string(),
                target,
                timeout,
            },
            HealthError::Aborted => ServiceError::AbortedDuringShutdown {
                key: key.to_string(),
            },
        }
    }
}

/// # Errors produced by the orchestrator.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// `start()` was called while the environment is not stopped.
    #[error("environment is already {state}")]
    AlreadyRunning {
        /// Current overall status.
        state: String,
    },

    /// A required environment check failed.
    #[error("environment check '{check}' failed: {reason}")]
    Environment {
        /// Check name.
        check: String,
        /// Why it failed.
        reason: String,
    },

    /// A required service in a required phase failed; the environment was torn down.
    #[error("phase '{phase}' failed: {source}")]
    PhaseFailed {
        /// Phase name.
        phase: String,
        /// Failure of the service that broke the phase.
        #[source]
        source: ServiceError,
    },

    /// Startup was cut short by a concurrent `stop()`.
    #[error("startup interrupted: {reason}")]
    Interrupted {
        /// What interrupted it.
        reason: String,
    },

    /// A required service failed after startup; the environment was stopped.
    #[error("environment stopped after a critical failure: {source}")]
    CriticalFailure {
        /// The critical service failure.
        #[source]
        source: ServiceError,
    },
}

impl OrchestratorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            OrchestratorError::AlreadyRunning { .. } => "orchestrator_already_running",
            OrchestratorError::Environment { .. } => "environment_check_failed",
            OrchestratorError::PhaseFailed { source, .. } => source.as_label(),
            OrchestratorError::Interrupted { .. } => "startup_interrupted",
            OrchestratorError::CriticalFailure { .. } => "critical_service_failure",
        }
    }

    /// Service-level cause, if the failure originated in one service.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            OrchestratorError::PhaseFailed { source, .. }
            | OrchestratorError::CriticalFailure { source } => Some(source),
            _ => None,
        }
    }

    /// Key of the failing service, if any.
    pub fn service(&self) -> Option<&str> {
        self.service_error().map(ServiceError::service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_timeout_maps_to_service_timeout() {
        let err = HealthError::Timeout {
            target: "tcp://localhost:27017".into(),
            timeout: Duration::from_secs(30),
        }
        .for_service("db");

        assert_eq!(err.as_label(), "health_check_timeout");
        assert_eq!(err.service(), "db");
        assert!(err.to_string().contains("localhost:27017"));
    }

    #[test]
    fn aborted_is_shutdown() {
        let err = HealthError::Aborted.for_service("api");
        assert!(err.is_shutdown());
        assert_eq!(err.service(), "api");
    }

    #[test]
    fn phase_failure_exposes_service() {
        let err = OrchestratorError::PhaseFailed {
            phase: "application".into(),
            source: ServiceError::HealthCheckTimeout {
                key: "api".into(),
                target: "http://localhost:8000/health".into(),
                timeout: Duration::from_secs(30),
            },
        };
        assert_eq!(err.service(), Some("api"));
        assert_eq!(err.as_label(), "health_check_timeout");
    }
}
