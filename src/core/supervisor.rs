//! # Supervisor: owns the live child processes.
//!
//! The [`Supervisor`] is the only component that mutates the process registry.
//! It starts, stops and restarts services, wires output capture, delegates
//! readiness to the [`HealthVerifier`], and applies the [`RestartPolicy`] when a
//! process exits unexpectedly.
//!
//! ## Lifecycle of one instance
//! ```text
//! start_service(desc)
//!   ├─► parse health target            (InvalidHealthTarget, nothing spawned)
//!   ├─► registry lock: exists? → ServiceAlreadyRunning
//!   │                  shutdown? → AbortedDuringShutdown
//!   │                  spawn     → ProcessSpawn on OS error
//!   │                  insert ProcessRecord { status: starting }
//!   ├─► exit watcher task (owns Child) ─► handle_exit() ─► exit notification
//!   └─► select! {
//!         exit               → ProcessExited (or Aborted if requested);
//!                              auto_restart services enter relaunch() first
//!         readiness:
//!           probe ok / settle → healthy   + ServiceReady + post-start hook (once)
//!           probe timeout     → unhealthy + ServiceUnhealthy → HealthCheckTimeout
//!           shutdown          → AbortedDuringShutdown
//!       }
//!
//! handle_exit(instance):
//!   remove record (only if it is still this instance)
//!   ├─ stopping or shutting down → ServiceStopped               (expected)
//!   ├─ starting                  → ServiceExit; the launcher handles it
//!   └─ healthy | unhealthy       → ServiceExit; relaunch() on a detached task
//!
//! relaunch(desc, restarts):
//!   RestartPolicy::decide(auto_restart, restarts)
//!     Restart{attempt, delay} → ServiceRestarting, sleep, launch(attempt)
//!     GiveUp + required       → CriticalServiceFailed (once per key)
//!     GiveUp + optional       → Warning, service stays absent
//! ```
//!
//! ## Stop protocol
//! ```text
//! stop_service(key, grace)
//!   status → stopping (first caller only), ServiceStopping
//!   SIGTERM to the process group
//!   select! { exit → done, sleep(grace) → SIGKILL, wait for exit }
//! ```
//! Every caller resolves on the same confirmed exit; the record is removed
//! before that exit is announced.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::config::SupervisorConfig;
use crate::core::process::{self, ExitInfo, Launched, ProcessHandle};
use crate::core::record::{OutputBuffer, OutputLine, ProcessRecord};
use crate::error::{HealthError, ServiceError};
use crate::events::{Bus, Event, EventKind};
use crate::health::{HealthTarget, HealthVerifier};
use crate::policies::RestartDecision;
use crate::services::{HookContext, HookRef, ServiceDescriptor, ServiceState, ServiceStatus};

/// A required service that exhausted its restarts (or may not restart).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalFailure {
    /// Service key.
    pub key: String,
    /// Last observed failure.
    pub reason: String,
}

impl From<CriticalFailure> for ServiceError {
    fn from(f: CriticalFailure) -> Self {
        ServiceError::CriticalServiceFailure {
            key: f.key,
            reason: f.reason,
        }
    }
}

enum Readiness {
    Exited(ExitInfo),
    Probed(Result<(), HealthError>),
}

/// Owns the process registry and the global shutdown flag.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    verifier: HealthVerifier,
    registry: Mutex<HashMap<String, ProcessRecord>>,
    shutdown: Mutex<CancellationToken>,
    critical: Mutex<HashSet<String>>,
    critical_tx: watch::Sender<Option<CriticalFailure>>,
    next_instance: AtomicU64,
    next_seq: AtomicU64,
}

impl Supervisor {
    /// Creates a supervisor publishing on `bus` and probing through `verifier`.
    pub fn new(cfg: SupervisorConfig, bus: Bus, verifier: HealthVerifier) -> Self {
        let (critical_tx, _) = watch::channel(None);
        Self {
            cfg,
            bus,
            verifier,
            registry: Mutex::new(HashMap::new()),
            shutdown: Mutex::new(CancellationToken::new()),
            critical: Mutex::new(HashSet::new()),
            critical_tx,
            next_instance: AtomicU64::new(1),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Launches `desc` and waits until it is ready.
    ///
    /// Resolves once the service is `healthy`. A probe timeout leaves the record
    /// tracked as `unhealthy` and fails with [`ServiceError::HealthCheckTimeout`];
    /// the caller decides whether to stop it.
    ///
    /// An `auto_restart` service that exits before it is ready goes through the
    /// restart policy; the call fails only once the policy gives up.
    pub async fn start_service(self: &Arc<Self>, desc: ServiceDescriptor) -> Result<(), ServiceError> {
        self.launch_supervised(desc, 0).await
    }

    /// Stops `key`: graceful signal, then a forceful one after `grace`.
    ///
    /// Logs and returns if `key` is not tracked. Concurrent callers all resolve
    /// on the same confirmed exit.
    pub async fn stop_service(&self, key: &str, grace: Duration) {
        let claimed = {
            let mut reg = self.registry.lock();
            reg.get_mut(key).map(|rec| {
                let initiated = rec.advance(ServiceState::Stopping);
                (rec.handle.clone(), initiated)
            })
        };
        let Some((handle, initiated)) = claimed else {
            tracing::warn!(service = %key, "stop requested for a service that is not running");
            return;
        };
        if !initiated || handle.has_exited() {
            handle.wait().await;
            return;
        }

        self.bus.publish(
            Event::new(EventKind::ServiceStopping)
                .with_service(key)
                .with_delay(grace),
        );
        tracing::debug!(service = %key, pid = ?handle.pid, ?grace, "terminating");
        handle.terminate();

        tokio::select! {
            _ = handle.wait() => {}
            _ = tokio::time::sleep(grace) => {
                tracing::warn!(service = %key, pid = ?handle.pid, ?grace, "grace period expired; killing");
                handle.kill();
                handle.wait().await;
            }
        }
    }

    /// Stops `key` and starts it again from its original descriptor.
    ///
    /// Manual restarts keep the restart counter unchanged.
    pub async fn restart_service(self: &Arc<Self>, key: &str) -> Result<(), ServiceError> {
        let (desc, restarts) = self
            .registry
            .lock()
            .get(key)
            .map(|rec| (rec.descriptor.clone(), rec.restarts))
            .ok_or_else(|| ServiceError::ServiceNotRunning {
                key: key.to_string(),
            })?;

        tracing::info!(service = %key, "restarting on request");
        self.stop_service(key, self.cfg.grace).await;

        let token = self.shutdown_token();
        tokio::select! {
            _ = token.cancelled() => {
                return Err(ServiceError::AbortedDuringShutdown { key: key.to_string() });
            }
            _ = tokio::time::sleep(self.cfg.restart_pause) => {}
        }
        self.launch_supervised(desc, restarts).await
    }

    /// Stops every tracked service concurrently, each with its own grace period.
    pub async fn stop_all(&self, grace: Duration) {
        let keys: Vec<String> = self.registry.lock().keys().cloned().collect();
        join_all(keys.iter().map(|key| self.stop_service(key, grace))).await;
    }

    /// Stops every tracked service one at a time, most recently started first.
    pub async fn stop_all_reverse(&self, grace: Duration) {
        let mut order: Vec<(u64, String)> = self
            .registry
            .lock()
            .iter()
            .map(|(key, rec)| (rec.start_seq, key.clone()))
            .collect();
        order.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        for (_, key) in order {
            self.stop_service(&key, grace).await;
        }
    }

    /// Sets the global "shutting down" flag.
    ///
    /// From here on exits are expected, readiness waits abort and no new
    /// process is spawned until [`Supervisor::reset`].
    pub fn begin_shutdown(&self) {
        self.shutdown.lock().cancel();
    }

    /// Clears the shutdown flag and the critical-failure latch for a new start.
    pub fn reset(&self) {
        *self.shutdown.lock() = CancellationToken::new();
        self.critical.lock().clear();
        self.critical_tx.send_replace(None);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.lock().is_cancelled()
    }

    /// Token of the current start generation; cancelled on shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.lock().clone()
    }

    /// Latest critical failure of the current generation (`None` until one occurs).
    pub fn subscribe_critical(&self) -> watch::Receiver<Option<CriticalFailure>> {
        self.critical_tx.subscribe()
    }

    /// Snapshots of every tracked service, keyed by service key.
    pub fn snapshot(&self) -> BTreeMap<String, ServiceStatus> {
        self.registry
            .lock()
            .iter()
            .map(|(key, rec)| (key.clone(), rec.snapshot()))
            .collect()
    }

    pub fn status(&self, key: &str) -> Option<ServiceStatus> {
        self.registry.lock().get(key).map(ProcessRecord::snapshot)
    }

    /// Recently captured output of `key`, oldest line first.
    pub fn recent_output(&self, key: &str) -> Option<Vec<OutputLine>> {
        let output = self.registry.lock().get(key).map(|rec| rec.output.clone())?;
        let lines = output.lock().snapshot();
        Some(lines)
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.registry.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().is_empty()
    }

    async fn launch_supervised(
        self: &Arc<Self>,
        desc: ServiceDescriptor,
        restarts: u32,
    ) -> Result<(), ServiceError> {
        let token = self.shutdown_token();
        match self.launch(desc.clone(), restarts).await {
            Err(err @ ServiceError::ProcessExited { .. }) if desc.auto_restart() => {
                let reason = err.to_string();
                self.relaunch(desc, restarts, reason, Some(err), token).await
            }
            other => other,
        }
    }

    async fn launch(self: &Arc<Self>, desc: ServiceDescriptor, restarts: u32) -> Result<(), ServiceError> {
        let key = desc.key().to_string();
        let probe = match desc.health() {
            Some(hc) => {
                let target = HealthTarget::parse(&hc.target).map_err(|reason| {
                    ServiceError::InvalidHealthTarget {
                        key: key.clone(),
                        target: hc.target.clone(),
                        reason,
                    }
                })?;
                Some((target, hc.timeout))
            }
            None => None,
        };

        let token = self.shutdown_token();
        let output = Arc::new(Mutex::new(OutputBuffer::new(self.cfg.output_lines_clamped())));

        let spawned = {
            let mut reg = self.registry.lock();
            if reg.contains_key(&key) {
                return Err(ServiceError::ServiceAlreadyRunning { key });
            }
            if token.is_cancelled() {
                return Err(ServiceError::AbortedDuringShutdown { key });
            }
            self.bus.publish(
                Event::new(EventKind::ServiceStarting)
                    .with_service(key.as_str())
                    .with_attempt(restarts),
            );
            process::spawn(&desc, output.clone(), &self.bus).map(|launched| {
                let instance = self.next_instance.fetch_add(1, Ordering::Relaxed);
                reg.insert(
                    key.clone(),
                    ProcessRecord {
                        instance,
                        start_seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                        descriptor: desc.clone(),
                        handle: launched.handle.clone(),
                        status: ServiceState::Starting,
                        started_at: SystemTime::now(),
                        started: Instant::now(),
                        restarts,
                        output,
                    },
                );
                (instance, launched)
            })
        };

        let (instance, launched) = match spawned {
            Ok(v) => v,
            Err(source) => {
                tracing::error!(service = %key, program = %desc.program(), error = %source, "failed to spawn");
                self.bus.publish(
                    Event::new(EventKind::ServiceError)
                        .with_service(key.as_str())
                        .with_reason(source.to_string()),
                );
                return Err(ServiceError::ProcessSpawn {
                    key,
                    program: desc.program().to_string(),
                    source,
                });
            }
        };

        let handle = self.watch_exit(&key, instance, launched);
        tracing::info!(service = %key, pid = ?handle.pid, command = %desc.command_line(), "spawned");

        let ready = tokio::select! {
            biased;
            info = handle.wait() => Readiness::Exited(info),
            res = self.await_ready(probe.as_ref(), &token) => Readiness::Probed(res),
        };

        match ready {
            Readiness::Exited(info) => Err(self.exited_before_ready(&key, info)),
            Readiness::Probed(Ok(())) => {
                if !self.advance(&key, instance, ServiceState::Healthy) {
                    return Err(self.lost_before_ready(&key, &handle).await);
                }
                tracing::info!(service = %key, pid = ?handle.pid, "ready");
                self.bus
                    .publish(Event::new(EventKind::ServiceReady).with_service(key.as_str()));
                if let Some(hook) = desc.post_start() {
                    self.spawn_hook(hook.clone(), &key, handle.pid, token);
                }
                Ok(())
            }
            Readiness::Probed(Err(HealthError::Aborted)) => {
                Err(ServiceError::AbortedDuringShutdown { key })
            }
            Readiness::Probed(Err(err)) => {
                let err = err.for_service(&key);
                if self.advance(&key, instance, ServiceState::Unhealthy) {
                    tracing::warn!(service = %key, error = %err, "health check timed out");
                    self.bus.publish(
                        Event::new(EventKind::ServiceUnhealthy)
                            .with_service(key.as_str())
                            .with_reason(err.to_string()),
                    );
                }
                Err(err)
            }
        }
    }

    async fn await_ready(
        &self,
        probe: Option<&(HealthTarget, Duration)>,
        token: &CancellationToken,
    ) -> Result<(), HealthError> {
        match probe {
            Some((target, timeout)) => {
                self.verifier
                    .wait_for_healthy(target, *timeout, token)
                    .await
            }
            None => tokio::select! {
                _ = token.cancelled() => Err(HealthError::Aborted),
                _ = tokio::time::sleep(self.cfg.settle_delay) => Ok(()),
            },
        }
    }

    /// Hands the child to a watcher task and returns the handle for this instance.
    fn watch_exit(self: &Arc<Self>, key: &str, instance: u64, launched: Launched) -> ProcessHandle {
        let Launched {
            child,
            handle,
            exit_tx,
            kill,
            readers,
        } = launched;

        let sup = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            let info = process::wait_exit(child, kill, readers).await;
            let info = sup.handle_exit(&key, instance, info);
            let _ = exit_tx.send(Some(info));
        });
        handle
    }

    fn handle_exit(self: &Arc<Self>, key: &str, instance: u64, info: ExitInfo) -> ExitInfo {
        let token = self.shutdown_token();
        let removed = {
            let mut reg = self.registry.lock();
            match reg.get(key) {
                Some(rec) if rec.instance == instance => reg.remove(key),
                _ => None,
            }
        };
        let Some(mut record) = removed else {
            tracing::debug!(service = %key, instance, "exit of a replaced instance");
            return info;
        };

        let requested = record.status == ServiceState::Stopping || token.is_cancelled();
        let info = ExitInfo { requested, ..info };

        if requested {
            record.advance(ServiceState::Stopping);
            record.advance(ServiceState::Stopped);
            tracing::info!(service = %key, status = %info, "stopped");
            self.bus.publish(
                Event::new(EventKind::ServiceStopped)
                    .with_service(key)
                    .with_exit(info.code, info.signal),
            );
            return info;
        }

        tracing::warn!(service = %key, status = %info, state = %record.status, "exited unexpectedly");
        self.bus.publish(
            Event::new(EventKind::ServiceExit)
                .with_service(key)
                .with_exit(info.code, info.signal)
                .with_reason(info.to_string()),
        );

        match record.status {
            ServiceState::Healthy | ServiceState::Unhealthy => {
                let sup = Arc::clone(self);
                let reason = info.to_string();
                tokio::spawn(async move {
                    let _ = sup
                        .relaunch(record.descriptor, record.restarts, reason, None, token)
                        .await;
                });
            }
            // The launcher is still waiting on this instance and reports the exit.
            _ => {}
        }
        info
    }

    /// Restart loop after an unexpected exit; `last` is returned if the policy gives up.
    async fn relaunch(
        self: &Arc<Self>,
        desc: ServiceDescriptor,
        mut restarts: u32,
        mut reason: String,
        mut last: Option<ServiceError>,
        token: CancellationToken,
    ) -> Result<(), ServiceError> {
        let key = desc.key().to_string();
        loop {
            let (attempt, delay) = match self.cfg.restart.decide(desc.auto_restart(), restarts) {
                RestartDecision::Restart { attempt, delay } => (attempt, delay),
                RestartDecision::GiveUp => {
                    self.give_up(&desc, restarts, reason.clone());
                    return Err(last.unwrap_or(ServiceError::CriticalServiceFailure { key, reason }));
                }
            };

            tracing::info!(service = %key, attempt, ?delay, "scheduling restart");
            self.bus.publish(
                Event::new(EventKind::ServiceRestarting)
                    .with_service(key.as_str())
                    .with_attempt(attempt)
                    .with_delay(delay),
            );
            tokio::select! {
                _ = token.cancelled() => {
                    return Err(ServiceError::AbortedDuringShutdown { key });
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match self.launch(desc.clone(), attempt).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_shutdown() => return Err(err),
                Err(err @ ServiceError::ServiceAlreadyRunning { .. }) => {
                    tracing::debug!(service = %key, "already started elsewhere; abandoning restart");
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(service = %key, attempt, error = %err, "restart failed");
                    if matches!(err, ServiceError::HealthCheckTimeout { .. }) {
                        self.stop_service(&key, self.cfg.grace).await;
                    }
                    restarts = attempt;
                    reason = err.to_string();
                    last = Some(err);
                }
            }
        }
    }

    fn give_up(&self, desc: &ServiceDescriptor, restarts: u32, reason: String) {
        let key = desc.key();
        if !desc.required() {
            tracing::warn!(service = %key, restarts, %reason, "optional service failed; leaving it stopped");
            self.bus.publish(Event::warning(
                Some(key),
                format!("optional service '{key}' stopped after {restarts} restarts: {reason}"),
            ));
            return;
        }
        if !self.critical.lock().insert(key.to_string()) {
            return;
        }
        tracing::error!(service = %key, restarts, %reason, "critical service failed");
        self.bus.publish(
            Event::new(EventKind::CriticalServiceFailed)
                .with_service(key)
                .with_attempt(restarts)
                .with_reason(reason.as_str()),
        );
        self.critical_tx.send_replace(Some(CriticalFailure {
            key: key.to_string(),
            reason,
        }));
    }

    fn spawn_hook(&self, hook: HookRef, key: &str, pid: Option<u32>, cancel: CancellationToken) {
        let bus = self.bus.clone();
        let ctx = HookContext {
            key: key.to_string(),
            pid,
            cancel,
        };
        tokio::spawn(async move {
            let key = ctx.key.clone();
            match hook.run(ctx).await {
                Ok(()) => tracing::debug!(service = %key, hook = %hook.name(), "post-start hook finished"),
                Err(err) => {
                    tracing::warn!(service = %key, hook = %hook.name(), error = %err, "post-start hook failed");
                    bus.publish(
                        Event::new(EventKind::HookFailed)
                            .with_service(key.as_str())
                            .with_reason(format!("{}: {err}", hook.name())),
                    );
                }
            }
        });
    }

    /// Moves the record of `instance` to `next`; false if it is gone or the edge is illegal.
    fn advance(&self, key: &str, instance: u64, next: ServiceState) -> bool {
        match self.registry.lock().get_mut(key) {
            Some(rec) if rec.instance == instance => rec.advance(next),
            _ => false,
        }
    }

    fn exited_before_ready(&self, key: &str, info: ExitInfo) -> ServiceError {
        if info.requested {
            return ServiceError::AbortedDuringShutdown {
                key: key.to_string(),
            };
        }
        tracing::warn!(service = %key, status = %info, "exited before becoming ready");
        ServiceError::ProcessExited {
            key: key.to_string(),
            status: info.to_string(),
        }
    }

    /// Readiness succeeded but the record already moved on (stop or exit).
    async fn lost_before_ready(&self, key: &str, handle: &ProcessHandle) -> ServiceError {
        let info = handle.wait().await;
        self.exited_before_ready(key, info)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::policies::{BackoffPolicy, RestartPolicy};
    use tokio::sync::broadcast;

    fn test_config() -> SupervisorConfig {
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

    fn supervisor() -> Arc<Supervisor> {
        let cfg = test_config();
        let verifier = HealthVerifier::network(cfg.health_interval, cfg.probe_timeout);
        Arc::new(Supervisor::new(cfg, Bus::new(256), verifier))
    }

    fn shell(key: &str, script: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(key, "sh").with_args(["-c", script])
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn settles_without_probe_and_stops() {
        let sup = supervisor();
        let mut rx = sup.bus().subscribe();

        sup.start_service(shell("api", "exec sleep 30")).await.unwrap();
        let status = sup.status("api").unwrap();
        assert_eq!(status.status, ServiceState::Healthy);
        assert!(status.pid.is_some());
        assert_eq!(status.restarts, 0);

        sup.stop_service("api", Duration::from_secs(2)).await;
        assert!(sup.status("api").is_none());

        let events: Vec<Event> = drain(&mut rx)
            .into_iter()
            .filter(|e| e.kind != EventKind::OutputLine)
            .collect();
        let stopping = events
            .iter()
            .find(|e| e.kind == EventKind::ServiceStopping)
            .unwrap();
        assert_eq!(stopping.delay_ms, Some(2000));

        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [
                EventKind::ServiceStarting,
                EventKind::ServiceReady,
                EventKind::ServiceStopping,
                EventKind::ServiceStopped,
            ]
        );
    }

    #[tokio::test]
    async fn rejects_duplicate_start() {
        let sup = supervisor();
        sup.start_service(shell("db", "exec sleep 30")).await.unwrap();

        let err = sup.start_service(shell("db", "exec sleep 30")).await.unwrap_err();
        assert_eq!(err.as_label(), "service_already_running");
        assert_eq!(sup.len(), 1);

        sup.stop_all(Duration::from_secs(1)).await;
        assert!(sup.is_empty());
    }

    #[tokio::test]
    async fn spawn_failure_leaves_no_record() {
        let sup = supervisor();
        let err = sup
            .start_service(ServiceDescriptor::new("ai", "/nonexistent/ollama"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ProcessSpawn { ref key, .. } if key == "ai"));
        assert!(!sup.is_running("ai"));
    }

    #[tokio::test]
    async fn invalid_target_is_rejected_before_spawn() {
        let sup = supervisor();
        let desc = shell("api", "exec sleep 30").with_health("ftp://nope", Duration::from_secs(1));
        let err = sup.start_service(desc).await.unwrap_err();
        assert_eq!(err.as_label(), "invalid_health_target");
        assert!(sup.is_empty());
    }

    #[tokio::test]
    async fn exit_before_readiness_fails_start() {
        let sup = supervisor();
        let err = sup.start_service(shell("web", "exit 3")).await.unwrap_err();
        match err {
            ServiceError::ProcessExited { key, status } => {
                assert_eq!(key, "web");
                assert_eq!(status, "exit code 3");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(sup.is_empty());
    }

    #[tokio::test]
    async fn startup_crash_goes_through_restart_policy() {
        let sup = supervisor();
        let mut critical = sup.subscribe_critical();
        let mut rx = sup.bus().subscribe();

        let err = sup
            .start_service(shell("api", "exit 1").with_auto_restart(true))
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "process_exited");
        assert!(sup.is_empty());

        let events = drain(&mut rx);
        let count = |kind: EventKind| events.iter().filter(|e| e.kind == kind).count();
        assert_eq!(count(EventKind::ServiceStarting), 4);
        assert_eq!(count(EventKind::ServiceExit), 4);
        assert_eq!(count(EventKind::ServiceRestarting), 3);
        assert_eq!(count(EventKind::CriticalServiceFailed), 1);

        let failure = critical.borrow_and_update().clone().unwrap();
        assert_eq!(failure.key, "api");
    }

    #[tokio::test]
    async fn startup_crash_recovers_on_relaunch() {
        let marker = std::env::temp_dir().join(format!("stackvisor-crash-once-{}", std::process::id()));
        let _ = std::fs::remove_file(&marker);
        let script = format!(
            "if [ -e '{m}' ]; then exec sleep 30; else touch '{m}'; exit 1; fi",
            m = marker.display()
        );

        let sup = supervisor();
        sup.start_service(shell("api", &script).with_auto_restart(true))
            .await
            .unwrap();

        let status = sup.status("api").unwrap();
        assert_eq!(status.status, ServiceState::Healthy);
        assert_eq!(status.restarts, 1);
        assert!(sup.subscribe_critical().borrow().is_none());

        sup.stop_all(Duration::from_secs(1)).await;
        let _ = std::fs::remove_file(&marker);
    }

    #[tokio::test]
    async fn stop_of_unknown_service_is_silent() {
        let sup = supervisor();
        sup.stop_service("ghost", Duration::from_millis(10)).await;
        assert!(sup.is_empty());
    }

    #[tokio::test]
    async fn restart_requires_running_service() {
        let sup = supervisor();
        let err = sup.restart_service("api").await.unwrap_err();
        assert_eq!(err.as_label(), "service_not_running");
    }

    #[tokio::test]
    async fn restart_replaces_process() {
        let sup = supervisor();
        sup.start_service(shell("api", "exec sleep 30")).await.unwrap();
        let before = sup.status("api").unwrap().pid;

        sup.restart_service("api").await.unwrap();
        let after = sup.status("api").unwrap();
        assert_eq!(after.status, ServiceState::Healthy);
        assert_ne!(after.pid, before);
        assert_eq!(after.restarts, 0);

        sup.stop_all(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn captures_recent_output() {
        let sup = supervisor();
        sup.start_service(shell("api", "echo listening; exec sleep 30"))
            .await
            .unwrap();
        let lines = sup.recent_output("api").unwrap();
        assert_eq!(lines[0].line, "listening");
        sup.stop_all(Duration::from_secs(1)).await;
        assert!(sup.recent_output("api").is_none());
    }

    #[tokio::test]
    async fn optional_crash_without_restart_only_warns() {
        let sup = supervisor();
        let mut critical = sup.subscribe_critical();
        let mut rx = sup.bus().subscribe();

        let desc = shell("ai", "sleep 0.2; exit 1").with_required(false);
        sup.start_service(desc).await.unwrap();

        let warning = loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == EventKind::Warning {
                break ev;
            }
        };
        assert!(warning.is_for("ai"));
        assert!(critical.borrow_and_update().is_none());
        assert!(!sup.is_running("ai"));
    }

    #[tokio::test]
    async fn shutdown_blocks_new_launches() {
        let sup = supervisor();
        sup.begin_shutdown();
        let err = sup.start_service(shell("api", "exec sleep 30")).await.unwrap_err();
        assert!(err.is_shutdown());

        sup.reset();
        assert!(!sup.is_shutting_down());
        sup.start_service(shell("api", "exec sleep 30")).await.unwrap();
        sup.stop_all(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn hook_failure_keeps_service_healthy() {
        use crate::services::{HookError, HookFn};

        let sup = supervisor();
        let mut rx = sup.bus().subscribe();
        let hook: HookRef = HookFn::arc("pull-models", |_ctx: HookContext| async {
            Err::<(), _>(HookError::from("registry unreachable"))
        });
        sup.start_service(shell("ai", "exec sleep 30").with_post_start(hook))
            .await
            .unwrap();

        let failed = loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == EventKind::HookFailed {
                break ev;
            }
        };
        assert!(failed.reason.as_deref().unwrap().contains("registry unreachable"));
        assert_eq!(sup.status("ai").unwrap().status, ServiceState::Healthy);
        sup.stop_all(Duration::from_secs(1)).await;
    }
}
