//! Runtime core: process ownership and lifecycle.
//!
//! The only public entry points are [`Supervisor`] and its configuration; the
//! rest is plumbing:
//! - [`supervisor`]: registry owner; start/stop/restart, exit handling, restart policy;
//! - [`process`]: spawning, output capture, signaling, exit watching;
//! - [`record`]: per-instance state and the bounded output buffer;
//! - [`config`]: supervisor and health polling knobs;
//! - [`shutdown`]: cross-platform OS termination signals.

mod config;
mod process;
mod record;
mod shutdown;
mod supervisor;

pub use config::SupervisorConfig;
pub use process::ExitInfo;
pub use record::{OutputBuffer, OutputLine};
pub(crate) use shutdown::wait_for_shutdown_signal;
pub use supervisor::{CriticalFailure, Supervisor};
