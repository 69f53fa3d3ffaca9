//! # stackvisor
//!
//! **Stackvisor** launches, health-verifies, supervises and tears down the set of
//! local background services that make up a development environment (a
//! database, an optional AI runtime, an API server, a frontend dev server...).
//!
//! Service definitions come from elsewhere; this crate consumes an ordered list
//! of [`ServiceDescriptor`]s and owns everything from spawn to exit.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Vec<ServiceDescriptor>
//!            │
//!            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Orchestrator                                                     │
//! │  - PhasePlan (datastore → ai-runtime → application → ...)         │
//! │  - EnvironmentCheck (host predicates, working directories)        │
//! │  - overall status: stopped/starting/running/stopping/error        │
//! └──────┬────────────────────────────────────────────────────────────┘
//!        │ start_service / stop_all / stop_all_reverse
//!        ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (sole owner of the process registry)                  │
//! │  - ProcessRecord per key (state machine, restarts, output ring)   │
//! │  - RestartPolicy (3 restarts, fixed 2s backoff)                   │
//! │  - HealthVerifier ──► Probe (HTTP GET 2xx / TCP connect)          │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   child process      child process      child process
//!   stdout/stderr ──► OutputBuffer + Event::OutputLine
//!
//!   Supervisor / Orchestrator ── publish(Event) ──► Bus (broadcast)
//!                                                     │
//!                                               SubscriberSet
//!                                        ┌────────────┼────────────┐
//!                                        ▼            ▼            ▼
//!                                    LogWriter       CLI         custom
//! ```
//!
//! ### Service lifecycle
//! ```text
//! starting ──► healthy ──► stopping ──► stopped
//!    │            │            ▲
//!    ├──► unhealthy ───────────┘
//!    └──► error
//!
//! unexpected exit (also before readiness, for auto_restart services):
//!   auto_restart && restarts < 3 → ServiceRestarting, sleep 2s, new instance
//!   otherwise, required          → CriticalServiceFailed → Orchestrator::stop()
//!   otherwise, optional          → Warning, service stays absent
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                           |
//! |-------------------|----------------------------------------------------------|----------------------------------------------|
//! | **Orchestration** | Phased startup, teardown, aggregated status.             | [`Orchestrator`], [`PhasePlan`]              |
//! | **Supervision**   | Spawn/stop/restart, output capture, restart policy.      | [`Supervisor`], [`RestartPolicy`]            |
//! | **Health**        | Bounded readiness polling over HTTP or TCP.              | [`HealthVerifier`], [`Probe`]                |
//! | **Services**      | Descriptors, post-start hooks, status snapshots.         | [`ServiceDescriptor`], [`PostStartHook`]     |
//! | **Subscriber API**| Lifecycle and output events for CLIs and loggers.        | [`Subscribe`], [`Event`]                     |
//! | **Errors**        | Typed errors carrying the failing service key.           | [`ServiceError`], [`OrchestratorError`]      |
//! | **Configuration** | Centralized runtime knobs.                               | [`SupervisorConfig`]                         |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust,no_run
//! use std::time::Duration;
//! use stackvisor::{Orchestrator, ServiceDescriptor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orch = Orchestrator::builder(SupervisorConfig::default()).build();
//!
//!     let services = vec![
//!         ServiceDescriptor::new("db", "mongod")
//!             .with_args(["--port", "27017"])
//!             .with_health("tcp://localhost:27017", Duration::from_secs(30))
//!             .with_phase("datastore"),
//!         ServiceDescriptor::new("api", "uvicorn")
//!             .with_args(["app.main:app", "--port", "8000"])
//!             .with_health("http://localhost:8000/health", Duration::from_secs(30)),
//!     ];
//!
//!     orch.run_until_signal(services).await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod health;
mod orchestrator;
mod policies;
mod services;
mod subscribers;

// ---- Public re-exports ----

pub use core::{CriticalFailure, ExitInfo, OutputBuffer, OutputLine, Supervisor, SupervisorConfig};
pub use error::{HealthError, OrchestratorError, ServiceError};
pub use events::{Bus, Event, EventKind, OutputStream};
pub use health::{HealthTarget, HealthVerifier, NetProbe, Probe};
pub use orchestrator::{
    EnvironmentCheck, Orchestrator, OrchestratorBuilder, Phase, PhasePlan, PhasePolicy,
};
pub use policies::{BackoffPolicy, RestartDecision, RestartPolicy};
pub use services::{
    DEFAULT_PHASE, DevServerState, EnvironmentStatus, HealthCheck, HookContext, HookError,
    HookFn, HookRef, PostStartHook, ServiceDescriptor, ServiceState, ServiceStatus,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Built-in tracing subscriber.
// Disable with: `--no-default-features`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
