//! # Service model.
//!
//! - [`ServiceDescriptor`] - immutable launch + health + policy description
//! - [`PostStartHook`], [`HookFn`] - callbacks run after readiness
//! - [`ServiceState`], [`ServiceStatus`], [`DevServerState`] - state machine and snapshots

mod descriptor;
mod hook;
mod status;

pub use descriptor::{DEFAULT_PHASE, HealthCheck, ServiceDescriptor};
pub use hook::{HookContext, HookError, HookFn, HookRef, PostStartHook};
pub use status::{DevServerState, EnvironmentStatus, ServiceState, ServiceStatus};
