//! # Post-start hooks.
//!
//! A [`PostStartHook`] runs once per launched instance, right after the service
//! reached readiness (for example pulling models into a freshly started AI runtime).
//! Hooks run on a detached task so they never hold back the next startup phase.
//! A failing hook publishes `HookFailed`; the service itself stays healthy.
//!
//! [`HookFn`] wraps a closure `F: Fn(HookContext) -> Fut`, producing a fresh future
//! per invocation.
//!
//! ## Example
//! ```rust
//! use stackvisor::{HookContext, HookError, HookFn, HookRef};
//!
//! let hook: HookRef = HookFn::arc("pull-models", |ctx: HookContext| async move {
//!     if ctx.cancel.is_cancelled() {
//!         return Ok(());
//!     }
//!     println!("{} is up (pid {:?})", ctx.key, ctx.pid);
//!     Ok::<_, HookError>(())
//! });
//! assert_eq!(hook.name(), "pull-models");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure reported by a post-start hook.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HookError(pub String);

impl From<&str> for HookError {
    fn from(s: &str) -> Self {
        HookError(s.to_string())
    }
}

impl From<String> for HookError {
    fn from(s: String) -> Self {
        HookError(s)
    }
}

/// What a hook gets to know about the instance it runs for.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Service key.
    pub key: String,
    /// Process id of the ready instance.
    pub pid: Option<u32>,
    /// Cancelled when the environment shuts down.
    pub cancel: CancellationToken,
}

/// Async callback invoked after a service becomes ready.
#[async_trait]
pub trait PostStartHook: Send + Sync + 'static {
    /// Stable, human-readable hook name.
    fn name(&self) -> &str;

    /// Runs the hook. Should return promptly once `ctx.cancel` fires.
    async fn run(&self, ctx: HookContext) -> Result<(), HookError>;
}

/// Shared handle to a hook.
pub type HookRef = Arc<dyn PostStartHook>;

/// Function-backed hook implementation.
pub struct HookFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HookFn<F> {
    /// Creates a new function-backed hook.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the hook and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> PostStartHook for HookFn<F>
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HookError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: HookContext) -> Result<(), HookError> {
        (self.f)(ctx).await
    }
}
