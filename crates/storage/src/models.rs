//! Storage models.
//!
//! These types describe what a listing hands back: [`Page`]s of
//! [`ObjectInfo`] descriptors, plus the [`ObjectMetadata`] of a single object.

use time::OffsetDateTime;

/// What to list, and how.
///
/// The bucket doubles as the "owning container" filter: a listing never
/// crosses buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListOptions {
    pub bucket: String,
    /// Only keys starting with this prefix.
    pub prefix: Option<String>,
    /// Maximum number of keys per page. Backends fall back to their own
    /// default (1000 for S3) when unset.
    pub page_size: Option<usize>,
}
impl ListOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
            page_size: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Whether `key` falls under the configured prefix (if any).
    pub fn matches(&self, key: &str) -> bool {
        self.prefix.as_deref().is_none_or(|prefix| key.starts_with(prefix))
    }
}

/// Descriptor of one object, as delivered by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Unique within its bucket
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    pub last_modified: Option<OffsetDateTime>,
    pub etag: Option<String>,
}
impl ObjectInfo {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
            etag: None,
        }
    }

    pub fn with_last_modified(mut self, last_modified: OffsetDateTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }
}

/// One delivery unit of a listing. Pages may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    objects: Vec<ObjectInfo>,
}
impl Page {
    pub fn new(objects: Vec<ObjectInfo>) -> Self {
        Self { objects }
    }

    pub fn objects(&self) -> &[ObjectInfo] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
impl IntoIterator for Page {
    type Item = ObjectInfo;
    type IntoIter = std::vec::IntoIter<ObjectInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.into_iter()
    }
}
impl FromIterator<ObjectInfo> for Page {
    fn from_iter<I: IntoIterator<Item = ObjectInfo>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Metadata of a single object, fetched on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<OffsetDateTime>,
}
