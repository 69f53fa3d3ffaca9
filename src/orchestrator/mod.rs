//! # Orchestrator: phased startup and environment lifecycle.
//!
//! - [`Orchestrator`] - start/stop/status over a list of service descriptors
//! - [`OrchestratorBuilder`] - wires bus, subscribers, verifier and supervisor
//! - [`PhasePlan`], [`PhasePolicy`] - grouping and start policy of phases
//! - [`EnvironmentCheck`] - host predicates validated before startup

mod builder;
mod environment;
#[allow(clippy::module_inception)]
mod orchestrator;
mod phase;

pub use builder::OrchestratorBuilder;
pub use environment::EnvironmentCheck;
pub use orchestrator::Orchestrator;
pub use phase::{Phase, PhasePlan, PhasePolicy};
