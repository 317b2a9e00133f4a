//! Reporting helpers shared by the collector and the scanner.

use bucketfan_pool::{DiagnosticsHandle, Event, TaskPool};
use std::future::Future;

/// Submit `task` for `item`. A rejection is reported, together with the
/// pool's status at that moment, and the item is skipped.
///
/// Returns whether the task was accepted.
pub(crate) fn submit_or_report<F>(pool: &TaskPool, item: &str, task: F) -> bool
where
    F: Future<Output = ()> + Send + 'static,
{
    match pool.submit(item, task) {
        Ok(()) => true,
        Err(err) => {
            pool.diagnostics().record(Event::Rejected {
                item: item.to_string(),
                reason: (*err).to_string(),
                status: pool.status(),
            });
            false
        },
    }
}

/// Report an item whose task failed, with the full error tree.
pub(crate) fn report_failure<K>(diagnostics: &DiagnosticsHandle, item: &str, err: &exn::Exn<K>)
where
    K: std::error::Error + Send + Sync + 'static,
{
    diagnostics.record(Event::TaskFailed {
        item: item.to_string(),
        message: (**err).to_string(),
        trace: format!("{err:?}"),
    });
}
