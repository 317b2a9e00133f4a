//! Paginated fan-out.
//!
//! A [`Collector`] walks a store's listing page by page. Every object on a
//! page is handed to a bounded [`TaskPool`] for enrichment, and once the
//! whole page has been processed its results are yielded as one [`Batch`].
//! Pages are yielded in the order the store delivers them; items within a
//! batch are in completion order.
//!
//! One pool serves the entire walk. It's created lazily (an empty source
//! never gets one), waited on between pages, and released exactly once:
//! drained at the end of the listing, or shut down by its drop guard if the
//! listing fails or the stream is dropped part way through.

mod object;

pub use self::object::EnrichedObject;
use crate::DEFAULT_COLLECTOR_WORKERS;
use crate::accumulator::Accumulator;
use crate::error::{ErrorKind, Result};
use crate::report::{report_failure, submit_or_report};
use async_stream::stream;
use bucketfan_pool::{DiagnosticsHandle, PoolConfig, TaskPool, TracingDiagnostics};
use bucketfan_storage::error::{Error as StorageError, Result as StorageResult};
use bucketfan_storage::{ListOptions, ObjectInfo, StoreHandle};
use exn::ResultExt;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;

/// The enriched items of one listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    /// Position of the page in the listing, starting at zero.
    pub index: usize,
    /// One entry per successfully enriched object, in no particular order.
    pub items: Vec<T>,
}

impl<T> Batch<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> IntoIterator for Batch<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[derive(Clone)]
pub struct Collector {
    config: PoolConfig,
    diagnostics: DiagnosticsHandle,
}

impl Collector {
    pub fn new(config: PoolConfig, diagnostics: DiagnosticsHandle) -> Self {
        Self { config, diagnostics }
    }

    /// Stream every object matching `options`, paired with its store.
    pub fn objects<'a>(
        &'a self,
        store: &'a StoreHandle,
        options: &'a ListOptions,
    ) -> impl Stream<Item = Result<Batch<EnrichedObject>>> + Send + 'a {
        let bucket = options.bucket.clone();
        self.collect(store, options, move |store, info| {
            let object = EnrichedObject::new(bucket.clone(), info, store);
            async move { Ok::<_, StorageError>(object) }
        })
    }

    /// Stream the result of `enrich` for every object matching `options`,
    /// one [`Batch`] per listing page.
    ///
    /// An object whose enrichment fails, panics, or is rejected by the pool
    /// is reported to diagnostics and left out of its batch; the stream
    /// carries on. Only a failure of the listing itself is yielded as an
    /// `Err`, after which the stream ends.
    pub fn collect<'a, T, F, Fut>(
        &'a self,
        store: &'a StoreHandle,
        options: &'a ListOptions,
        enrich: F,
    ) -> impl Stream<Item = Result<Batch<T>>> + Send + 'a
    where
        T: Send + 'static,
        F: Fn(StoreHandle, ObjectInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StorageResult<T>> + Send + 'static,
    {
        let enrich = Arc::new(enrich);
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            match store.probe(options).await.or_raise(|| ErrorKind::Listing) {
                Ok(true) => {},
                Ok(false) => return,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            }

            let pool = match TaskPool::new(self.config, self.diagnostics.clone()).or_raise(|| ErrorKind::Pool) {
                Ok(pool) => pool,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            pool.report_status("Initialized");

            let mut pages = store.list_pages(options);
            let mut index = 0;
            while let Some(page) = pages.next().await {
                let page = match page.or_raise(|| ErrorKind::Listing) {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                };
                let batch = Accumulator::<Vec<T>>::new();
                for object in page {
                    let key = object.key.clone();
                    let task = enrich_one(
                        Arc::clone(&enrich),
                        Arc::clone(store),
                        object,
                        batch.clone(),
                        self.diagnostics.clone(),
                    );
                    submit_or_report(&pool, &key, task);
                }
                pool.wait_idle().await;
                yield Ok(Batch { index, items: batch.take() });
                index += 1;
            }
            pool.drain().await;
        })
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(PoolConfig::new(DEFAULT_COLLECTOR_WORKERS), TracingDiagnostics::handle())
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector").field("config", &self.config).finish_non_exhaustive()
    }
}

async fn enrich_one<T, F, Fut>(
    enrich: Arc<F>,
    store: StoreHandle,
    object: ObjectInfo,
    batch: Accumulator<Vec<T>>,
    diagnostics: DiagnosticsHandle,
) where
    F: Fn(StoreHandle, ObjectInfo) -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let key = object.key.clone();
    match enrich(store, object).await {
        Ok(item) => batch.push(item),
        Err(err) => report_failure(&diagnostics, &key, &err),
    }
}
