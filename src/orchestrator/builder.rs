use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use super::environment::EnvironmentCheck;
use super::orchestrator::Orchestrator;
use super::phase::{PhasePlan, PhasePolicy};
use crate::{
    core::{Supervisor, SupervisorConfig},
    events::{Bus, Event},
    health::{HealthVerifier, Probe},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for an [`Orchestrator`] and the runtime behind it.
pub struct OrchestratorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    plan: PhasePlan,
    checks: Vec<EnvironmentCheck>,
    probe: Option<Arc<dyn Probe>>,
}

impl OrchestratorBuilder {
    /// Creates a builder with the default phase plan and network probes.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            plan: PhasePlan::default(),
            checks: Vec::new(),
            probe: None,
        }
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets a dedicated worker with a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one event subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Replaces the phase table.
    pub fn with_phase_plan(mut self, plan: PhasePlan) -> Self {
        self.plan = plan;
        self
    }

    /// Overrides or appends one phase policy.
    pub fn with_phase(mut self, policy: PhasePolicy) -> Self {
        self.plan = self.plan.with_policy(policy);
        self
    }

    /// Adds a host check run at the beginning of every `start()`.
    pub fn with_check(mut self, check: EnvironmentCheck) -> Self {
        self.checks.push(check);
        self
    }

    /// Replaces the network probe used for readiness checks.
    pub fn with_probe(mut self, probe: Arc<dyn Probe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Builds the orchestrator.
    ///
    /// Initializes the event bus, subscriber workers, health verifier and
    /// supervisor. Must be called from within a tokio runtime.
    pub fn build(self) -> Arc<Orchestrator> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());

        if !self.subscribers.is_empty() {
            let subs = SubscriberSet::new(self.subscribers, bus.clone());
            spawn_fanout(bus.subscribe(), subs);
        }

        let verifier = match self.probe {
            Some(probe) => HealthVerifier::new(probe, self.cfg.health_interval),
            None => HealthVerifier::network(self.cfg.health_interval, self.cfg.probe_timeout),
        };

        let supervisor = Arc::new(Supervisor::new(self.cfg, bus, verifier));
        Orchestrator::new(supervisor, self.plan, self.checks)
    }
}

/// Forwards bus events to the subscriber set until the bus closes.
fn spawn_fanout(mut rx: broadcast::Receiver<Event>, subs: SubscriberSet) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => subs.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber fan-out lagged behind the bus; events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        subs.shutdown().await;
    });
}
