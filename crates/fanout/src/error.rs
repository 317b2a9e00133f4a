//! Fan-out Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Only failures that stop a whole operation end up here. Anything that goes
//! wrong with a single item is reported to diagnostics and the item skipped.

use derive_more::{Display, Error};

/// A fan-out error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for fan-out operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a fan-out failure.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The listing itself failed; without a source there is nothing to do.
    #[display("object listing failed")]
    Listing,
    /// The task pool could not be created.
    #[display("task pool unavailable")]
    Pool,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Listing)
    }
}
