//! # Consumers of the supervision event stream.
//!
//! A [`Subscribe`] implementation is how a CLI, a log sink or a status panel
//! follows the environment: service lifecycle, phase progress, warnings and
//! every line a child writes to stdout/stderr.
//!
//! Delivery goes through [`SubscriberSet`](crate::SubscriberSet), which gives
//! each subscriber its own bounded queue and worker. Two consequences matter
//! when writing one:
//!
//! - Output lines dominate the traffic. A chatty dev server (webpack, uvicorn
//!   with reload) can emit hundreds of `OutputLine` events per second, while
//!   lifecycle events are rare. Size [`Subscribe::queue_capacity`] for the
//!   output volume you expect to render; a subscriber that only cares about
//!   lifecycle can filter early and keep the default.
//! - When the queue is full the event is dropped for that subscriber alone and
//!   a `SubscriberOverflow` event is published. Lines of one service's stream
//!   that do arrive are still in emission order, so a dropped line shows up as
//!   a gap, never as reordering.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use stackvisor::{Event, EventKind, Subscribe};
//!
//! struct Console;
//!
//! #[async_trait]
//! impl Subscribe for Console {
//!     async fn on_event(&self, ev: &Event) {
//!         match (ev.kind, ev.service.as_deref(), &ev.line) {
//!             (EventKind::OutputLine, Some(key), Some(line)) => println!("[{key}] {line}"),
//!             (EventKind::CriticalServiceFailed, Some(key), _) => eprintln!("!! {key} is down"),
//!             _ => {}
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "console" }
//!     fn queue_capacity(&self) -> usize { 4096 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives lifecycle and output events of the supervised services.
///
/// `on_event` runs on the subscriber's own worker, one event at a time. Slow
/// rendering or I/O only backs up this subscriber's queue; supervision and
/// other subscribers keep going. A panic is caught and reported as
/// `SubscriberPanicked`, and the worker continues with the next event.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Name reported in `SubscriberOverflow` / `SubscriberPanicked` events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue depth for this subscriber, clamped to at least 1.
    ///
    /// Default: 1024, enough for a few services with moderate output.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
