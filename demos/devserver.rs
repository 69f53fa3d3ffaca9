//! # Local dev environment example
//!
//! Brings up a small stack of stand-in services and keeps it running until
//! Ctrl-C:
//! - `db`: a shell loop standing in for a database (no probe, settles after 1s)
//! - `ai`: an optional runtime whose binary is missing (degrades to a warning)
//! - `web`: `python3 -m http.server`, probed over HTTP
//!
//! Lifecycle events are rendered by the built-in `LogWriter`; a custom
//! subscriber counts restarts and failures.
//!
//! ## Run
//! ```bash
//! RUST_LOG=info,stackvisor::output=debug cargo run --example devserver
//! ```

use std::{
    sync::Arc,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use stackvisor::{
    EnvironmentCheck, Event, EventKind, HookContext, HookError, HookFn, HookRef, LogWriter,
    Orchestrator, ServiceDescriptor, Subscribe, SupervisorConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct FailureCounter {
    restarts: AtomicU64,
    warnings: AtomicU64,
    errors: AtomicU64,
}

impl FailureCounter {
    fn print_stats(&self) {
        println!();
        println!("Failures:");
        println!(" ├─► Restarts: {}", self.restarts.load(Ordering::Relaxed));
        println!(" ├─► Warnings: {}", self.warnings.load(Ordering::Relaxed));
        println!(" └─► Errors:   {}", self.errors.load(Ordering::Relaxed));
    }
}

#[async_trait::async_trait]
impl Subscribe for FailureCounter {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::ServiceRestarting => {
                self.restarts.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::Warning => {
                self.warnings.fetch_add(1, Ordering::Relaxed);
            }
            EventKind::ServiceError | EventKind::CriticalServiceFailed | EventKind::HookFailed => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    fn name(&self) -> &'static str {
        "failure-counter"
    }
}

fn services() -> Vec<ServiceDescriptor> {
    let announce: HookRef = HookFn::arc("announce", |ctx: HookContext| async move {
        println!("web is up (pid {:?}): http://127.0.0.1:8765/", ctx.pid);
        Ok::<(), HookError>(())
    });

    vec![
        ServiceDescriptor::new("db", "sh")
            .with_name("Database")
            .with_args(["-c", "echo 'db: accepting connections'; while :; do sleep 5; done"])
            .with_phase("datastore")
            .with_auto_restart(true),
        ServiceDescriptor::new("ai", "ollama-not-installed")
            .with_args(["serve"])
            .with_phase("ai-runtime")
            .with_required(false),
        ServiceDescriptor::new("web", "python3")
            .with_name("Frontend")
            .with_args(["-m", "http.server", "8765", "--bind", "127.0.0.1"])
            .with_env("PYTHONUNBUFFERED", "1")
            .with_health("http://127.0.0.1:8765/", Duration::from_secs(15))
            .with_post_start(announce),
    ]
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let counter = Arc::new(FailureCounter::default());
    let orch = Orchestrator::builder(SupervisorConfig::default())
        .with_subscriber(Arc::new(LogWriter::new()))
        .with_subscriber(Arc::clone(&counter) as Arc<dyn Subscribe>)
        .with_check(EnvironmentCheck::program_on_path("python3", true))
        .with_check(EnvironmentCheck::program_on_path("docker", false))
        .build();

    let result = orch.run_until_signal(services()).await;
    println!("{}", serde_json::to_string_pretty(&orch.status())?);
    counter.print_stats();
    result?;
    Ok(())
}
