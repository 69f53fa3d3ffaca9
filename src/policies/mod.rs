//! Restart and backoff policies.
//!
//! This module groups the knobs that control **if** a crashed service is relaunched
//! and **how long** to wait before the next launch.
//!
//! ## Contents
//! - [`RestartPolicy`] restart cap plus backoff, consulted on every unexpected exit
//! - [`BackoffPolicy`] how delays evolve between relaunches (first / factor / max)
//!
//! ## Quick wiring
//! ```text
//! ServiceDescriptor { auto_restart, required, .. }
//!      └─► core::Supervisor on unexpected exit:
//!           RestartPolicy::decide(auto_restart, restarts)
//!             ├─ Restart { attempt, delay } ─► sleep(delay) ─► launch again
//!             └─ GiveUp                     ─► critical failure / warning
//! ```
//!
//! ## Defaults
//! - `max_restarts = 3`
//! - `BackoffPolicy::default()` → fixed 2s (factor 1.0), no growth.

mod backoff;
mod restart;

pub use backoff::BackoffPolicy;
pub use restart::{RestartDecision, RestartPolicy};
