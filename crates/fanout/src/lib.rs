//! Bounded fan-out over object listings.
//!
//! Two consumers of a [`TaskPool`](bucketfan_pool::TaskPool) sit on top of
//! an [`ObjectStore`](bucketfan_storage::ObjectStore):
//!
//! - [`Collector`] walks the listing page by page and streams one [`Batch`]
//!   of enriched objects per page.
//! - [`Scanner`] lists everything up front and returns the keys whose ACL
//!   satisfies a predicate (by default: publicly readable).
//!
//! Per-object failures never abort either of them; they're reported through
//! the injected diagnostics sink and the object is skipped.

mod accumulator;
mod collector;
pub mod error;
mod report;
mod scanner;

pub use crate::accumulator::Accumulator;
pub use crate::collector::{Batch, Collector, EnrichedObject};
pub use crate::scanner::Scanner;

/// Workers used by a [`Collector`] when nothing else is configured.
pub const DEFAULT_COLLECTOR_WORKERS: usize = 16;
/// Workers used by a [`Scanner`] when nothing else is configured.
pub const DEFAULT_SCANNER_WORKERS: usize = 56;
