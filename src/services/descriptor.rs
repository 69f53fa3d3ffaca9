//! # Service descriptors.
//!
//! A [`ServiceDescriptor`] is the static, immutable description of one managed
//! process: how to launch it, how to tell it is ready, and how failures are
//! treated. Descriptors are produced by an external resolver and handed to the
//! orchestrator as an ordered list.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use stackvisor::ServiceDescriptor;
//!
//! let db = ServiceDescriptor::new("db", "mongod")
//!     .with_name("MongoDB")
//!     .with_args(["--port", "27017"])
//!     .with_health("tcp://localhost:27017", Duration::from_secs(30))
//!     .with_phase("datastore");
//!
//! assert!(db.required());
//! assert_eq!(db.program(), "mongod");
//! assert_eq!(db.health().unwrap().timeout, Duration::from_secs(30));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::services::hook::HookRef;

/// Default phase tag for descriptors that do not declare one.
pub const DEFAULT_PHASE: &str = "application";

/// Readiness probe declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// `http(s)://...` URL or `tcp://host:port` / `host:port`.
    pub target: String,
    /// Upper bound for the whole readiness wait.
    pub timeout: Duration,
}

/// Immutable description of one managed service.
#[derive(Clone)]
pub struct ServiceDescriptor {
    key: String,
    name: String,
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    health: Option<HealthCheck>,
    required: bool,
    auto_restart: bool,
    phase: String,
    post_start: Option<HookRef>,
}

impl ServiceDescriptor {
    /// Creates a required, non-restarting descriptor in the `application` phase.
    pub fn new(key: impl Into<String>, program: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            health: None,
            required: true,
            auto_restart: false,
            phase: DEFAULT_PHASE.to_string(),
            post_start: None,
        }
    }

    /// Returns a new descriptor with updated display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Appends one argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory (inherited from the orchestrator when unset).
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds one environment variable to the overlay.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Declares a readiness probe.
    pub fn with_health(mut self, target: impl Into<String>, timeout: Duration) -> Self {
        self.health = Some(HealthCheck {
            target: target.into(),
            timeout,
        });
        self
    }

    /// Marks the service required (fatal on failure) or optional.
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Enables automatic restarts after unexpected exits.
    pub fn with_auto_restart(mut self, auto_restart: bool) -> Self {
        self.auto_restart = auto_restart;
        self
    }

    /// Sets the startup phase tag.
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = phase.into();
        self
    }

    /// Registers a hook that runs once after each instance becomes ready.
    pub fn with_post_start(mut self, hook: HookRef) -> Self {
        self.post_start = Some(hook);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn health(&self) -> Option<&HealthCheck> {
        self.health.as_ref()
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn auto_restart(&self) -> bool {
        self.auto_restart
    }

    pub fn phase(&self) -> &str {
        &self.phase
    }

    pub fn post_start(&self) -> Option<&HookRef> {
        self.post_start.as_ref()
    }

    /// Program and arguments joined for display.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("command", &self.command_line())
            .field("working_dir", &self.working_dir)
            .field("env", &self.env)
            .field("health", &self.health)
            .field("required", &self.required)
            .field("auto_restart", &self.auto_restart)
            .field("phase", &self.phase)
            .field("post_start", &self.post_start.as_ref().map(|h| h.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let d = ServiceDescriptor::new("api", "uvicorn");
        assert_eq!(d.name(), "api");
        assert_eq!(d.phase(), DEFAULT_PHASE);
        assert!(d.required());
        assert!(!d.auto_restart());
        assert!(d.health().is_none());
        assert!(d.working_dir().is_none());
    }

    #[test]
    fn command_line_joins_args() {
        let d = ServiceDescriptor::new("web", "npm").with_args(["run", "dev"]);
        assert_eq!(d.command_line(), "npm run dev");
    }

    #[test]
    fn env_overlay_is_sorted_and_overwritable() {
        let d = ServiceDescriptor::new("api", "python")
            .with_env("PORT", "8000")
            .with_env("DEBUG", "1")
            .with_env("PORT", "8001");
        let keys: Vec<&str> = d.env().keys().map(String::as_str).collect();
        assert_eq!(keys, ["DEBUG", "PORT"]);
        assert_eq!(d.env()["PORT"], "8001");
    }
}
