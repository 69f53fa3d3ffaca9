//! # Orchestrator: phased startup, aggregated status, shutdown protocol.
//!
//! ```text
//! start(descriptors)
//!   stopped|error → starting            (else AlreadyRunning)
//!   supervisor.reset(), validate()      (Environment error → stopped)
//!   for phase in plan:
//!     PhaseStarted
//!     sequential: start one at a time, stop at the first fatal failure
//!     parallel:   start all, join all, then inspect
//!     required member of required phase failed → PhaseFailed
//!         starting → error → reverse-order teardown → stopped
//!     optional member / optional phase failed  → Warning, continue
//!     PhaseCompleted
//!   starting → running, StartupComplete
//!
//! stop()
//!   starting|running|error → stopping   (else wait for stopped)
//!   ShutdownStarted, supervisor.begin_shutdown()
//!   stop every service in parallel, each with its own grace
//!   ShutdownComplete, → stopped
//!
//! critical failure (from the supervisor)
//!   starting|running → error → stop()
//! ```
//!
//! Overall status lives in a `watch` channel so waiters (concurrent `stop()`,
//! interrupted `start()`) resolve on the single transition to `stopped`.

use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::core::{CriticalFailure, Supervisor, SupervisorConfig, wait_for_shutdown_signal};
use crate::error::{OrchestratorError, ServiceError};
use crate::events::{Event, EventKind};
use crate::orchestrator::builder::OrchestratorBuilder;
use crate::orchestrator::environment::{self, EnvironmentCheck};
use crate::orchestrator::phase::{Phase, PhasePlan};
use crate::services::{DevServerState, EnvironmentStatus, ServiceDescriptor, ServiceStatus};

#[derive(Clone, Copy, Debug)]
enum Teardown {
    Parallel,
    Reverse,
}

#[derive(Default)]
struct Inner {
    started_at: Option<SystemTime>,
    warnings: Vec<String>,
    critical: Option<CriticalFailure>,
}

/// Drives the supervisor through startup phases and owns the aggregated status.
pub struct Orchestrator {
    supervisor: Arc<Supervisor>,
    plan: PhasePlan,
    checks: Vec<EnvironmentCheck>,
    grace: Duration,
    status_tx: watch::Sender<EnvironmentStatus>,
    inner: Mutex<Inner>,
}

impl Orchestrator {
    /// Starts building an orchestrator with the given supervisor configuration.
    pub fn builder(cfg: SupervisorConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(cfg)
    }

    pub(crate) fn new(
        supervisor: Arc<Supervisor>,
        plan: PhasePlan,
        checks: Vec<EnvironmentCheck>,
    ) -> Arc<Self> {
        let (status_tx, _) = watch::channel(EnvironmentStatus::Stopped);
        let grace = supervisor.config().grace;
        let orch = Arc::new(Self {
            supervisor,
            plan,
            checks,
            grace,
            status_tx,
            inner: Mutex::new(Inner::default()),
        });
        Self::spawn_critical_listener(&orch);
        orch
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Receiver of every lifecycle and output event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.supervisor.bus().subscribe()
    }

    /// Watch of the overall status.
    pub fn watch_status(&self) -> watch::Receiver<EnvironmentStatus> {
        self.status_tx.subscribe()
    }

    /// Starts every descriptor phase by phase.
    ///
    /// On a fatal failure everything already started is stopped in reverse start
    /// order before the error is returned; the environment ends `stopped`.
    pub async fn start(
        &self,
        descriptors: Vec<ServiceDescriptor>,
    ) -> Result<DevServerState, OrchestratorError> {
        let mut current = EnvironmentStatus::Stopped;
        let claimed = self.status_tx.send_if_modified(|s| match s {
            EnvironmentStatus::Stopped | EnvironmentStatus::Error => {
                *s = EnvironmentStatus::Starting;
                true
            }
            other => {
                current = *other;
                false
            }
        });
        if !claimed {
            return Err(OrchestratorError::AlreadyRunning {
                state: current.to_string(),
            });
        }

        self.supervisor.reset();
        {
            let mut inner = self.inner.lock();
            inner.started_at = Some(SystemTime::now());
            inner.warnings.clear();
            inner.critical = None;
        }

        let warnings = match environment::validate(&self.checks, &descriptors) {
            Ok(w) => w,
            Err(err) => {
                tracing::error!(error = %err, "environment validation failed");
                self.inner.lock().started_at = None;
                self.status_tx.send_replace(EnvironmentStatus::Stopped);
                return Err(err);
            }
        };
        for w in warnings {
            self.warn(None, w);
        }

        let phases = self.plan.plan(&descriptors);
        tracing::info!(services = descriptors.len(), phases = phases.len(), "starting environment");

        for phase in &phases {
            if let Err(err) = self.run_phase(phase).await {
                return Err(self.abort_start(&phase.policy.name, err).await);
            }
        }

        let promoted = self.status_tx.send_if_modified(|s| {
            if *s == EnvironmentStatus::Starting {
                *s = EnvironmentStatus::Running;
                true
            } else {
                false
            }
        });
        if !promoted {
            self.wait_for(EnvironmentStatus::Stopped).await;
            return Err(self.interrupted());
        }

        tracing::info!(services = self.supervisor.len(), "environment running");
        self.supervisor
            .bus()
            .publish(Event::new(EventKind::StartupComplete));
        Ok(self.status())
    }

    /// Stops every tracked service; concurrent and repeated calls resolve on the
    /// same transition to `stopped`.
    pub async fn stop(&self) {
        self.stop_with(Teardown::Parallel).await;
    }

    /// Aggregated snapshot; never waits on I/O.
    pub fn status(&self) -> DevServerState {
        let status = *self.status_tx.borrow();
        let (started_at, warnings) = {
            let inner = self.inner.lock();
            (inner.started_at, inner.warnings.clone())
        };
        DevServerState {
            status,
            started_at,
            services: self.supervisor.snapshot(),
            warnings,
        }
    }

    pub fn service_status(&self, key: &str) -> Option<ServiceStatus> {
        self.supervisor.status(key)
    }

    /// Critical failure that stopped the current (or last) run, if any.
    pub fn critical_failure(&self) -> Option<CriticalFailure> {
        self.inner.lock().critical.clone()
    }

    /// Starts the environment, keeps it up until a termination signal or a
    /// critical failure, then stops it.
    pub async fn run_until_signal(
        &self,
        descriptors: Vec<ServiceDescriptor>,
    ) -> Result<(), OrchestratorError> {
        self.start(descriptors).await?;

        tokio::select! {
            res = wait_for_shutdown_signal() => {
                if let Err(err) = res {
                    tracing::warn!(error = %err, "cannot listen for termination signals; stopping");
                }
            }
            _ = self.wait_for_any(&[EnvironmentStatus::Stopping, EnvironmentStatus::Stopped]) => {}
        }

        self.stop().await;
        match self.critical_failure() {
            Some(failure) => Err(OrchestratorError::CriticalFailure {
                source: failure.into(),
            }),
            None => Ok(()),
        }
    }

    async fn run_phase(&self, phase: &Phase) -> Result<(), ServiceError> {
        let policy = &phase.policy;
        let name = policy.name.as_str();
        tracing::info!(
            phase = %name,
            services = phase.services.len(),
            parallel = policy.parallel,
            required = policy.required,
            "starting phase"
        );
        self.supervisor
            .bus()
            .publish(Event::new(EventKind::PhaseStarted).with_phase(name));

        let results: Vec<(&ServiceDescriptor, Result<(), ServiceError>)> = if policy.parallel {
            join_all(phase.services.iter().map(|desc| async move {
                (desc, self.supervisor.start_service(desc.clone()).await)
            }))
            .await
        } else {
            let mut out = Vec::with_capacity(phase.services.len());
            for desc in &phase.services {
                let res = self.supervisor.start_service(desc.clone()).await;
                let halt = match &res {
                    Ok(()) => false,
                    Err(err) => err.is_shutdown() || desc.required(),
                };
                out.push((desc, res));
                if halt {
                    break;
                }
            }
            out
        };

        let mut cause: Option<ServiceError> = None;
        for (desc, res) in results {
            let Err(err) = res else {
                continue;
            };
            if err.is_shutdown() && self.supervisor.is_shutting_down() {
                return Err(err);
            }
            if desc.required() {
                if cause.is_none() {
                    cause = Some(err);
                } else {
                    tracing::error!(phase = %name, service = %desc.key(), error = %err, "required service failed");
                }
            } else {
                self.warn(
                    Some(desc.key()),
                    format!("optional service '{}' failed to start: {err}", desc.key()),
                );
            }
        }

        let Some(err) = cause else {
            self.supervisor
                .bus()
                .publish(Event::new(EventKind::PhaseCompleted).with_phase(name));
            return Ok(());
        };

        self.supervisor.bus().publish(
            Event::new(EventKind::PhaseFailed)
                .with_phase(name)
                .with_service(err.service())
                .with_reason(err.to_string()),
        );
        if policy.required {
            return Err(err);
        }
        self.warn(
            Some(err.service()),
            format!("optional phase '{name}' failed: {err}"),
        );
        Ok(())
    }

    async fn abort_start(&self, phase: &str, err: ServiceError) -> OrchestratorError {
        if err.is_shutdown() && self.supervisor.is_shutting_down() {
            self.wait_for(EnvironmentStatus::Stopped).await;
            return self.interrupted();
        }

        tracing::error!(phase = %phase, service = %err.service(), error = %err, "startup failed; tearing down");
        self.status_tx.send_if_modified(|s| {
            if *s == EnvironmentStatus::Starting {
                *s = EnvironmentStatus::Error;
                true
            } else {
                false
            }
        });
        self.stop_with(Teardown::Reverse).await;

        OrchestratorError::PhaseFailed {
            phase: phase.to_string(),
            source: err,
        }
    }

    async fn stop_with(&self, order: Teardown) {
        let claimed = self.status_tx.send_if_modified(|s| match s {
            EnvironmentStatus::Starting | EnvironmentStatus::Running | EnvironmentStatus::Error => {
                *s = EnvironmentStatus::Stopping;
                true
            }
            _ => false,
        });
        if !claimed {
            self.wait_for(EnvironmentStatus::Stopped).await;
            return;
        }

        tracing::info!(services = self.supervisor.len(), ?order, "shutting down");
        let bus = self.supervisor.bus();
        bus.publish(Event::new(EventKind::ShutdownStarted));
        self.supervisor.begin_shutdown();

        match order {
            Teardown::Parallel => self.supervisor.stop_all(self.grace).await,
            Teardown::Reverse => self.supervisor.stop_all_reverse(self.grace).await,
        }

        self.inner.lock().started_at = None;
        tracing::info!("shutdown complete");
        bus.publish(Event::new(EventKind::ShutdownComplete));
        self.status_tx.send_replace(EnvironmentStatus::Stopped);
    }

    fn spawn_critical_listener(this: &Arc<Self>) {
        let mut rx = this.supervisor.subscribe_critical();
        let weak: Weak<Self> = Arc::downgrade(this);

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let failure = rx.borrow_and_update().clone();
                let Some(failure) = failure else {
                    continue;
                };
                let Some(me) = weak.upgrade() else {
                    break;
                };
                me.on_critical(failure).await;
            }
        });
    }

    async fn on_critical(&self, failure: CriticalFailure) {
        let escalated = self.status_tx.send_if_modified(|s| match s {
            EnvironmentStatus::Starting | EnvironmentStatus::Running => {
                *s = EnvironmentStatus::Error;
                true
            }
            _ => false,
        });
        if !escalated {
            return;
        }
        tracing::error!(service = %failure.key, reason = %failure.reason, "critical service failure; stopping environment");
        self.inner.lock().critical = Some(failure);
        self.stop().await;
    }

    fn interrupted(&self) -> OrchestratorError {
        match self.critical_failure() {
            Some(failure) => OrchestratorError::CriticalFailure {
                source: failure.into(),
            },
            None => OrchestratorError::Interrupted {
                reason: "stop requested during startup".into(),
            },
        }
    }

    fn warn(&self, subject: Option<&str>, message: String) {
        tracing::warn!(service = subject.unwrap_or("-"), "{message}");
        self.supervisor
            .bus()
            .publish(Event::warning(subject, message.as_str()));
        self.inner.lock().warnings.push(message);
    }

    async fn wait_for(&self, target: EnvironmentStatus) {
        self.wait_for_any(&[target]).await;
    }

    async fn wait_for_any(&self, targets: &[EnvironmentStatus]) {
        let mut rx = self.status_tx.subscribe();
        let _reached = rx.wait_for(|s| targets.contains(s)).await.is_ok();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::policies::{BackoffPolicy, RestartPolicy};

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            restart: RestartPolicy {
                max_restarts: 3,
                backoff: BackoffPolicy::fixed(Duration::from_millis(20)),
            },
            settle_delay: Duration::from_millis(50),
            restart_pause: Duration::from_millis(10),
            grace: Duration::from_secs(2),
            health_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(200),
            ..SupervisorConfig::default()
        }
    }

    fn shell(key: &str, phase: &str, script: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(key, "sh")
            .with_args(["-c", script])
            .with_phase(phase)
    }

    #[tokio::test]
    async fn start_and_stop_round_trip() {
        let orch = Orchestrator::builder(config()).build();
        let state = orch
            .start(vec![
                shell("db", "datastore", "exec sleep 30"),
                shell("api", "application", "exec sleep 30"),
            ])
            .await
            .unwrap();
        assert_eq!(state.status, EnvironmentStatus::Running);
        assert!(state.all_healthy());
        assert_eq!(state.services.len(), 2);
        assert!(state.started_at.is_some());

        orch.stop().await;
        let state = orch.status();
        assert_eq!(state.status, EnvironmentStatus::Stopped);
        assert!(state.services.is_empty());
        assert!(orch.service_status("db").is_none());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let orch = Orchestrator::builder(config()).build();
        orch.start(vec![shell("api", "application", "exec sleep 30")])
            .await
            .unwrap();

        let err = orch.start(vec![]).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyRunning { ref state } if state == "running"));
        orch.stop().await;
    }

    #[tokio::test]
    async fn stop_when_stopped_is_a_no_op() {
        let orch = Orchestrator::builder(config()).build();
        let mut rx = orch.subscribe();
        orch.stop().await;
        assert_eq!(orch.status().status, EnvironmentStatus::Stopped);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_required_check_leaves_environment_stopped() {
        let orch = Orchestrator::builder(config())
            .with_check(EnvironmentCheck::required("container engine", || false))
            .build();
        let err = orch
            .start(vec![shell("db", "datastore", "exec sleep 30")])
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "environment_check_failed");
        assert_eq!(orch.status().status, EnvironmentStatus::Stopped);
        assert!(orch.supervisor().is_empty());
    }

    #[tokio::test]
    async fn optional_check_failure_is_recorded_as_warning() {
        let orch = Orchestrator::builder(config())
            .with_check(EnvironmentCheck::optional("gpu", || false))
            .build();
        let state = orch
            .start(vec![shell("api", "application", "exec sleep 30")])
            .await
            .unwrap();
        assert_eq!(state.warnings.len(), 1);
        assert!(state.warnings[0].contains("gpu"));
        orch.stop().await;
    }

    #[tokio::test]
    async fn optional_phase_failure_does_not_abort() {
        let orch = Orchestrator::builder(config()).build();
        let state = orch
            .start(vec![
                shell("ollama", "ai-runtime", "exit 1"),
                shell("api", "application", "exec sleep 30"),
            ])
            .await
            .unwrap();
        assert_eq!(state.status, EnvironmentStatus::Running);
        assert!(state.services.contains_key("api"));
        assert!(!state.services.contains_key("ollama"));
        assert!(state.warnings.iter().any(|w| w.contains("ai-runtime")));
        orch.stop().await;
    }

    #[tokio::test]
    async fn required_exit_during_startup_tears_down_in_reverse() {
        let orch = Orchestrator::builder(config()).build();
        let mut rx = orch.subscribe();
        let err = orch
            .start(vec![
                shell("db", "datastore", "exec sleep 30"),
                shell("cache", "datastore", "exec sleep 30"),
                shell("api", "application", "exit 2"),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PhaseFailed { ref phase, .. } if phase == "application"));
        assert_eq!(err.service(), Some("api"));
        assert_eq!(orch.status().status, EnvironmentStatus::Stopped);

        let mut stopping = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ServiceStopping {
                stopping.push(ev.service.unwrap().to_string());
            }
        }
        assert_eq!(stopping, ["cache", "db"]);
    }

    #[tokio::test]
    async fn critical_failure_after_startup_stops_everything() {
        let orch = Orchestrator::builder(config()).build();
        let mut status = orch.watch_status();
        orch.start(vec![
            shell("db", "datastore", "sleep 0.3; exit 1"),
            shell("api", "application", "exec sleep 30"),
        ])
        .await
        .unwrap();

        status
            .wait_for(|s| *s == EnvironmentStatus::Stopped)
            .await
            .unwrap();
        let failure = orch.critical_failure().unwrap();
        assert_eq!(failure.key, "db");
        assert!(orch.supervisor().is_empty());
    }
}
