//! Object store trait and implementations.
//!
//! This module defines the `ObjectStore` trait, the capability the fan-out
//! engine consumes: page-by-page listing, a cheap emptiness probe, and
//! per-object metadata and ACL lookups. Backends (S3-compatible services, an
//! in-memory mock) implement it.

#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

#[cfg(feature = "mock")]
pub use self::mock::MockStore;
#[cfg(feature = "s3")]
pub use self::s3::S3Store;
use crate::acl::Grant;
use crate::error::Result;
use crate::models::{ListOptions, ObjectInfo, ObjectMetadata, Page};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt, TryStreamExt};
use std::pin::Pin;

pub type PageStream<'a> = Pin<Box<dyn Stream<Item = Result<Page>> + Send + 'a>>;
pub type ObjectStream<'a> = Pin<Box<dyn Stream<Item = Result<ObjectInfo>> + Send + 'a>>;

/// Unified interface for object stores.
///
/// All operations are asynchronous; listing is delivered one [`Page`] at a
/// time with no total count known up front.
///
/// # Examples
///
/// ```
/// use futures::TryStreamExt;
/// use bucketfan_storage::{ListOptions, ObjectStore, error::Result};
///
/// async fn largest_page(store: &dyn ObjectStore) -> Result<usize> {
///     let options = ListOptions::new("my-bucket").with_prefix("logs/");
///     let mut pages = store.list_pages(&options);
///     let mut largest = 0;
///     while let Some(page) = pages.try_next().await? {
///         largest = largest.max(page.len());
///     }
///     Ok(largest)
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the configured store (used for logging only).
    fn name(&self) -> &str;

    /// Cheapest possible check for "is there anything to list at all?".
    ///
    /// Returns `true` if at least one object matches `options`.
    async fn probe(&self, options: &ListOptions) -> Result<bool>;

    /// Stream the listing one page at a time, in the order the service
    /// delivers them.
    ///
    /// Empty pages are passed through as they are. A failure to fetch a page
    /// is yielded as an `Err` item, after which the stream ends.
    fn list_pages<'a>(&'a self, options: &'a ListOptions) -> PageStream<'a>;

    /// Stream the listing one object at a time.
    ///
    /// Default implementation flattens [`list_pages()`](Self::list_pages).
    fn list_stream<'a>(&'a self, options: &'a ListOptions) -> ObjectStream<'a> {
        let mut pages = self.list_pages(options);
        Box::pin(stream! {
            while let Some(page) = pages.next().await {
                match page {
                    Ok(page) => for object in page {
                        yield Ok(object);
                    },
                    Err(e) => {
                        yield Err(e);
                        return;
                    },
                }
            }
        })
    }

    /// List every matching object.
    ///
    /// Default implementation collects [`list_stream()`](Self::list_stream)
    /// into a [`Vec`] before returning.
    async fn list(&self, options: &ListOptions) -> Result<Vec<ObjectInfo>> {
        self.list_stream(options).try_collect().await
    }

    /// Fetch the metadata of a single object.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata>;

    /// Fetch the access control grants of a single object.
    ///
    /// Returns [`PermissionDenied`](crate::error::ErrorKind::PermissionDenied)
    /// when the caller may not read the ACL; see
    /// [`AclOutcome`](crate::AclOutcome) for telling that apart from other
    /// failures.
    async fn acl(&self, bucket: &str, key: &str) -> Result<Vec<Grant>>;
}
