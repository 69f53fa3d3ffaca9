//! # Health verification.
//!
//! - [`HealthTarget`] - parsed HTTP or TCP readiness target
//! - [`Probe`] / [`NetProbe`] - one probe attempt (HTTP GET 2xx, TCP connect)
//! - [`HealthVerifier`] - polls a probe at a fixed interval under a timeout,
//!   aborting as soon as shutdown is signaled

mod probe;
mod target;
mod verifier;

pub use probe::{NetProbe, Probe};
pub use target::HealthTarget;
pub use verifier::HealthVerifier;
