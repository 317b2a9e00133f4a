//! In-memory object store for testing.

use super::PageStream;
use crate::acl::Grant;
use crate::error::{ErrorKind, Result};
use crate::models::{ListOptions, ObjectInfo, ObjectMetadata, Page};
use crate::ObjectStore;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// In-memory object store for testing.
///
/// Buckets are laid out as explicit pages, so tests control exactly what
/// each page of a listing contains (including empty pages). ACLs default to
/// "no grants"; failures can be injected per key, and the listing itself can
/// be made to fail after a number of pages. Call counters let tests check
/// how much remote work was done.
///
/// # Examples
///
/// ```
/// use bucketfan_storage::{Grant, Grantee, ListOptions, ObjectStore, Permission};
/// use bucketfan_storage::backend::MockStore;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MockStore::default()
///     .with_pages("bucket", [vec!["a", "b"], vec![], vec!["c"]])
///     .with_acl("bucket", "a", [Grant::new(Grantee::group("AllUsers"), Permission::Read)]);
/// let objects = store.list(&ListOptions::new("bucket")).await?;
/// assert_eq!(objects.len(), 3);
/// assert_eq!(store.acl("bucket", "a").await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockStore {
    name: Option<String>,
    buckets: HashMap<String, Vec<Vec<ObjectInfo>>>,
    acls: HashMap<(String, String), Vec<Grant>>,
    failures: HashMap<String, ErrorKind>,
    fail_listing_after: Option<usize>,
    listing_calls: AtomicUsize,
    probe_calls: AtomicUsize,
    acl_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
}

impl MockStore {
    /// Change the name of the mock store.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append pages to `bucket`, one inner list of keys per page. Every
    /// object gets a size equal to its key length.
    pub fn with_pages<P, K>(mut self, bucket: impl Into<String>, pages: impl IntoIterator<Item = P>) -> Self
    where
        P: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let layout = self.buckets.entry(bucket.into()).or_default();
        for page in pages {
            layout.push(
                page.into_iter()
                    .map(|key| {
                        let key = key.into();
                        let size = key.len() as u64;
                        ObjectInfo::new(key, size)
                    })
                    .collect(),
            );
        }
        self
    }

    /// Add `keys` to `bucket`, split into pages of the default page size.
    pub fn with_objects<K: Into<String>>(self, bucket: impl Into<String>, keys: impl IntoIterator<Item = K>) -> Self {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let pages: Vec<Vec<String>> = keys.chunks(DEFAULT_PAGE_SIZE).map(<[String]>::to_vec).collect();
        self.with_pages(bucket, pages)
    }

    pub fn with_acl(
        mut self,
        bucket: impl Into<String>,
        key: impl Into<String>,
        grants: impl IntoIterator<Item = Grant>,
    ) -> Self {
        self.acls.insert((bucket.into(), key.into()), grants.into_iter().collect());
        self
    }

    /// Make every per-object call (ACL and metadata) for `key` fail with `kind`.
    pub fn with_failure(mut self, key: impl Into<String>, kind: ErrorKind) -> Self {
        self.failures.insert(key.into(), kind);
        self
    }

    /// Shorthand for an access denied failure on `key`.
    pub fn with_denied(self, key: impl Into<String>) -> Self {
        let key = key.into();
        let kind = ErrorKind::PermissionDenied(key.clone());
        self.with_failure(key, kind)
    }

    /// Deliver `pages` pages, then fail the listing.
    pub fn fail_listing_after(mut self, pages: usize) -> Self {
        self.fail_listing_after = Some(pages);
        self
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::Relaxed)
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::Relaxed)
    }

    pub fn acl_calls(&self) -> usize {
        self.acl_calls.load(Ordering::Relaxed)
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::Relaxed)
    }

    fn pages(&self, options: &ListOptions) -> Vec<Page> {
        let Some(layout) = self.buckets.get(&options.bucket) else {
            return Vec::new();
        };
        layout
            .iter()
            .map(|page| page.iter().filter(|object| options.matches(&object.key)).cloned().collect())
            .collect()
    }

    fn object(&self, bucket: &str, key: &str) -> Result<&ObjectInfo> {
        if let Some(kind) = self.failures.get(key) {
            exn::bail!(kind.clone());
        }
        self.buckets
            .get(bucket)
            .into_iter()
            .flatten()
            .flatten()
            .find(|object| object.key == key)
            .ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(format!("{bucket}/{key}"))))
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("mock")
    }

    async fn probe(&self, options: &ListOptions) -> Result<bool> {
        self.probe_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.pages(options).iter().any(|page| !page.is_empty()))
    }

    fn list_pages<'a>(&'a self, options: &'a ListOptions) -> PageStream<'a> {
        self.listing_calls.fetch_add(1, Ordering::Relaxed);
        let pages = self.pages(options);
        let fail_after = self.fail_listing_after;
        Box::pin(stream! {
            for (index, page) in pages.into_iter().enumerate() {
                if fail_after.is_some_and(|limit| index >= limit) {
                    yield Err(exn::Exn::from(ErrorKind::Network(format!("listing interrupted at page {index}"))));
                    return;
                }
                yield Ok(page);
            }
        })
    }

    async fn metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::Relaxed);
        let object = self.object(bucket, key)?;
        Ok(ObjectMetadata {
            key: object.key.clone(),
            size: object.size,
            content_type: None,
            etag: object.etag.clone(),
            last_modified: object.last_modified,
        })
    }

    async fn acl(&self, bucket: &str, key: &str) -> Result<Vec<Grant>> {
        self.acl_calls.fetch_add(1, Ordering::Relaxed);
        self.object(bucket, key)?;
        Ok(self.acls.get(&(bucket.to_string(), key.to_string())).cloned().unwrap_or_default())
    }
}
