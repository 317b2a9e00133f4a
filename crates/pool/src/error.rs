//! Pool Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A pool error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// [`Saturated`](Self::Saturated) and [`Closed`](Self::Closed) are the two
/// rejection outcomes of [`TaskPool::submit`](crate::TaskPool::submit); both
/// carry the label of the task that was turned away so the caller can report
/// it and move on to the next item.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A pool needs at least one worker.
    #[display("invalid worker count: {_0}")]
    InvalidWorkerCount(#[error(not(source))] usize),
    /// Workers are Tokio tasks; there must be a runtime to spawn them on.
    #[display("no Tokio runtime available to spawn workers")]
    NoRuntime,
    /// Every worker is busy and the queue is full.
    #[display("pool saturated, rejected task: {_0}")]
    Saturated(#[error(not(source))] String),
    /// The pool has been shut down.
    #[display("pool closed, rejected task: {_0}")]
    Closed(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Saturated(_))
    }

    /// Returns `true` for the two submission rejection outcomes.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Saturated(_) | Self::Closed(_))
    }
}
