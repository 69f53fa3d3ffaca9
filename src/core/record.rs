//! # Process records and output buffers.
//!
//! One [`ProcessRecord`] exists per live service key. It is created when a launch
//! begins, mutated only by the supervisor, and removed once the OS confirms the
//! process exited. A restart inserts a fresh record carrying the incremented
//! restart counter.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::core::process::ProcessHandle;
use crate::events::OutputStream;
use crate::services::{ServiceDescriptor, ServiceState, ServiceStatus};

/// One captured line of child output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

/// Bounded FIFO of recent output lines; the oldest line is evicted first.
#[derive(Debug)]
pub struct OutputBuffer {
    lines: VecDeque<OutputLine>,
    capacity: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    pub fn push(&mut self, stream: OutputStream, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(OutputLine {
            stream,
            line: line.into(),
        });
    }

    pub fn snapshot(&self) -> Vec<OutputLine> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

pub(crate) type SharedOutput = Arc<Mutex<OutputBuffer>>;

/// Supervisor-owned state of one process instance.
pub(crate) struct ProcessRecord {
    /// Unique per launch; lets exit handlers ignore records that replaced theirs.
    pub instance: u64,
    /// Launch order, used for reverse-order teardown.
    pub start_seq: u64,
    pub descriptor: ServiceDescriptor,
    pub handle: ProcessHandle,
    pub status: ServiceState,
    pub started_at: SystemTime,
    pub started: Instant,
    pub restarts: u32,
    pub output: SharedOutput,
}

impl ProcessRecord {
    /// Applies `next` if it is a legal edge from the current state.
    pub fn advance(&mut self, next: ServiceState) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    pub fn snapshot(&self) -> ServiceStatus {
        ServiceStatus {
            key: self.descriptor.key().to_string(),
            name: self.descriptor.name().to_string(),
            status: self.status,
            pid: self.handle.pid,
            started_at: self.started_at,
            uptime: self.started.elapsed(),
            restarts: self.restarts,
        }
    }
}
