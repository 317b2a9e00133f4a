//! Diagnostics sink.
//!
//! Components never log through a process-wide logger directly; they are
//! handed a [`DiagnosticsHandle`] and report structured [`Event`]s to it. The
//! default sink, [`TracingDiagnostics`], turns those events into `tracing`
//! records. Tests swap in a [`RecordingDiagnostics`] to assert on what was
//! reported.

use crate::PoolStatus;
use std::sync::Arc;

/// Shared handle to a diagnostics sink.
pub type DiagnosticsHandle = Arc<dyn Diagnostics>;

/// Something worth telling the operator about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Snapshot of a pool's counters, with the reason it was taken.
    PoolStatus { context: String, status: PoolStatus },
    /// A task was turned away by the pool and its item skipped.
    Rejected { item: String, reason: String, status: PoolStatus },
    /// A task returned an error; `trace` is the full error tree.
    TaskFailed { item: String, message: String, trace: String },
    /// The remote side refused access to an item. Expected, so no trace.
    AccessDenied { item: String, message: String },
    /// A task panicked; the worker caught it and carried on. `message` is
    /// the panic payload only; there is no error tree to trace.
    TaskPanicked { item: String, message: String },
    /// A pool stopped accepting work.
    PoolShutdown { status: PoolStatus },
    /// Per-item trace line, only emitted when debug is enabled.
    Examining { item: String },
    /// A container is about to be processed.
    Processing { container: String, count: usize },
}

/// Receives [`Event`]s from pools, collectors and scanners.
pub trait Diagnostics: Send + Sync {
    fn record(&self, event: Event);

    /// Gate for per-item debug events, so callers can skip building them.
    fn debug_enabled(&self) -> bool {
        false
    }
}

/// Forwards every [`Event`] to `tracing`.
///
/// Rejections, failures, access denials and panics are errors; everything
/// else is debug.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl TracingDiagnostics {
    pub fn handle() -> DiagnosticsHandle {
        Arc::new(Self)
    }
}

impl Diagnostics for TracingDiagnostics {
    fn record(&self, event: Event) {
        match event {
            Event::PoolStatus { context, status } => tracing::debug!(
                context = %context,
                workers = status.workers,
                queue_depth = status.queue_depth,
                completed = status.completed,
                "Task pool status"
            ),
            Event::Rejected { item, reason, status } => tracing::error!(
                item = %item,
                reason = %reason,
                workers = status.workers,
                queue_depth = status.queue_depth,
                completed = status.completed,
                "Task submission rejected"
            ),
            Event::TaskFailed { item, message, trace } => {
                tracing::error!(item = %item, error = %message, "Error processing object");
                tracing::error!(item = %item, "Backtrace: {trace}");
            },
            Event::AccessDenied { item, message } => {
                tracing::error!(item = %item, error = %message, "Access denied for object")
            },
            Event::TaskPanicked { item, message } => {
                tracing::error!(item = %item, panic = %message, "Task panicked; worker recovered")
            },
            Event::PoolShutdown { status } => tracing::debug!(
                workers = status.workers,
                queue_depth = status.queue_depth,
                completed = status.completed,
                "Task pool shut down"
            ),
            Event::Examining { item } => tracing::debug!(item = %item, "Examining key"),
            Event::Processing { container, count } => {
                tracing::debug!(container = %container, objects = count, "Processing container")
            },
        }
    }

    fn debug_enabled(&self) -> bool {
        tracing::enabled!(tracing::Level::DEBUG)
    }
}

/// Keeps every [`Event`] in memory, in the order received.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: std::sync::Mutex<Vec<Event>>,
    debug: bool,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingDiagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Same as [`new()`](Self::new), but reports debug as enabled.
    pub fn verbose() -> Arc<Self> {
        Arc::new(Self {
            debug: true,
            ..Self::default()
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Count the recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    pub fn shutdowns(&self) -> usize {
        self.count(|event| matches!(event, Event::PoolShutdown { .. }))
    }

    pub fn status_reports(&self) -> usize {
        self.count(|event| matches!(event, Event::PoolStatus { .. }))
    }

    /// Items named by [`Event::Rejected`] events.
    pub fn rejected(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Rejected { item, .. } => Some(item),
                _ => None,
            })
            .collect()
    }
}

#[cfg(any(test, feature = "testing"))]
impl Diagnostics for RecordingDiagnostics {
    fn record(&self, event: Event) {
        self.events.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(event);
    }

    fn debug_enabled(&self) -> bool {
        self.debug
    }
}
