//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to lifecycle and output events.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`OutputStream`] stdout/stderr tag for captured lines
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` (lifecycle, restarts), output readers (`OutputLine`),
//!   exit watchers, `Orchestrator` (phases, warnings, shutdown), `SubscriberSet` workers.
//! - **Consumers**: the subscriber listener (fans out to `SubscriberSet`) and any
//!   receiver handed out by `Orchestrator::subscribe`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, OutputStream};
