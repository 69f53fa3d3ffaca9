//! # Restart policy for crashed services.
//!
//! [`RestartPolicy`] decides what happens after an **unexpected** exit (the
//! supervisor is not shutting down and nobody asked the service to stop):
//!
//! ```text
//! auto_restart && restarts < max_restarts  → Restart { attempt: restarts + 1, delay }
//! otherwise                                → GiveUp
//! ```
//!
//! `GiveUp` on a required service is fatal to the environment; on an optional
//! service it is logged and the service stays absent.

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// Outcome of [`RestartPolicy::decide`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RestartDecision {
    /// Relaunch after `delay`; `attempt` is the new restart counter (1-based).
    Restart { attempt: u32, delay: Duration },
    /// No further restarts.
    GiveUp,
}

/// Bounded restart policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestartPolicy {
    /// Maximum number of automatic restarts per service.
    pub max_restarts: u32,
    /// Delay before each restart.
    pub backoff: BackoffPolicy,
}

impl Default for RestartPolicy {
    /// Three restarts with a fixed 2s backoff.
    fn default() -> Self {
        Self {
            max_restarts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RestartPolicy {
    /// Decides whether a service that has already been restarted `restarts` times
    /// may be relaunched.
    pub fn decide(&self, auto_restart: bool, restarts: u32) -> RestartDecision {
        if !auto_restart || restarts >= self.max_restarts {
            return RestartDecision::GiveUp;
        }
        RestartDecision::Restart {
            attempt: restarts + 1,
            delay: self.backoff.next(restarts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_exactly_max_restarts() {
        let policy = RestartPolicy::default();
        let mut restarts = 0;
        while let RestartDecision::Restart { attempt, delay } = policy.decide(true, restarts) {
            assert_eq!(delay, Duration::from_secs(2));
            restarts = attempt;
        }
        assert_eq!(restarts, 3);
    }

    #[test]
    fn never_restarts_without_auto_restart() {
        let policy = RestartPolicy::default();
        assert_eq!(policy.decide(false, 0), RestartDecision::GiveUp);
    }

    #[test]
    fn zero_cap_gives_up_immediately() {
        let policy = RestartPolicy {
            max_restarts: 0,
            ..RestartPolicy::default()
        };
        assert_eq!(policy.decide(true, 0), RestartDecision::GiveUp);
    }
}
