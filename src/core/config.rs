//! # Supervisor configuration.
//!
//! Provides [`SupervisorConfig`], the centralized knobs of the process supervisor
//! and its health verifier. Nothing here is read from files; embedders build the
//! struct (usually from `Default`) and override what they need.
//!
//! ## Sentinel values
//! - `grace = 0s` → no graceful window, the forceful signal follows immediately
//! - `settle_delay = 0s` → services without a probe are ready as soon as they spawn

use std::time::Duration;

use crate::policies::RestartPolicy;

/// Global configuration for the process supervisor.
///
/// ## Field semantics
/// - `restart`: cap and backoff applied to unexpected exits of `auto_restart` services
/// - `settle_delay`: readiness delay for services without a health probe
/// - `restart_pause`: pause between stop and start in `restart_service`
/// - `grace`: default wait between the graceful and the forceful termination signal
/// - `output_lines`: capacity of each per-service output ring buffer (min 1)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `health_interval`: poll interval of the health verifier
/// - `probe_timeout`: upper bound of one probe attempt
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub restart: RestartPolicy,
    pub settle_delay: Duration,
    pub restart_pause: Duration,
    pub grace: Duration,
    pub output_lines: usize,
    pub bus_capacity: usize,
    pub health_interval: Duration,
    pub probe_timeout: Duration,
}

impl SupervisorConfig {
    /// Output buffer capacity clamped to a minimum of 1.
    #[inline]
    pub fn output_lines_clamped(&self) -> usize {
        self.output_lines.max(1)
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `restart = RestartPolicy::default()` (3 restarts, fixed 2s backoff)
    /// - `settle_delay = 1s`
    /// - `restart_pause = 1s`
    /// - `grace = 5s`
    /// - `output_lines = 200`
    /// - `bus_capacity = 1024`
    /// - `health_interval = 1s`
    /// - `probe_timeout = 5s`
    fn default() -> Self {
        Self {
            restart: RestartPolicy::default(),
            settle_delay: Duration::from_secs(1),
            restart_pause: Duration::from_secs(1),
            grace: Duration::from_secs(5),
            output_lines: 200,
            bus_capacity: 1024,
            health_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(5),
        }
    }
}
