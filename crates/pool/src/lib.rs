//! Bounded task pool.
//!
//! A [`TaskPool`] runs labelled futures on a fixed number of Tokio worker
//! tasks. Admission is bounded: once `workers + queue_capacity` tasks are
//! outstanding, [`submit()`](TaskPool::submit) rejects instead of queueing
//! without limit, and the caller decides what to do with the item (usually:
//! report it and move on). A panicking task is caught and reported, never
//! propagated. Shutdown is idempotent and also happens on drop.
//!
//! Everything the pool has to say goes through an injected
//! [`Diagnostics`](diagnostics::Diagnostics) sink rather than a global logger.

pub mod diagnostics;
pub mod error;
mod pool;

pub use crate::diagnostics::{Diagnostics, DiagnosticsHandle, Event, TracingDiagnostics};
pub use crate::pool::{DEFAULT_QUEUE_CAPACITY, PoolConfig, PoolStatus, TaskPool};
