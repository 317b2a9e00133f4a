use bucketfan_storage::error::Result as StorageResult;
use bucketfan_storage::{AclOutcome, Grant, ObjectInfo, ObjectMetadata, StoreHandle};
use std::fmt;

/// A listed object, still attached to the store it came from.
///
/// This is what [`Collector::objects()`](super::Collector::objects) produces:
/// enough to identify the object plus a handle for fetching anything else
/// about it later.
#[derive(Clone)]
pub struct EnrichedObject {
    bucket: String,
    info: ObjectInfo,
    store: StoreHandle,
}

impl EnrichedObject {
    pub fn new(bucket: impl Into<String>, info: ObjectInfo, store: StoreHandle) -> Self {
        Self {
            bucket: bucket.into(),
            info,
            store,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.info.key
    }

    pub fn info(&self) -> &ObjectInfo {
        &self.info
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub async fn acl(&self) -> StorageResult<Vec<Grant>> {
        self.store.acl(&self.bucket, self.key()).await
    }

    /// Same as [`acl()`](Self::acl), with access denial told apart from
    /// other failures.
    pub async fn acl_outcome(&self) -> AclOutcome {
        AclOutcome::from(self.acl().await)
    }

    pub async fn metadata(&self) -> StorageResult<ObjectMetadata> {
        self.store.metadata(&self.bucket, self.key()).await
    }
}

impl fmt::Debug for EnrichedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichedObject")
            .field("bucket", &self.bucket)
            .field("info", &self.info)
            .field("store", &self.store.name())
            .finish()
    }
}

impl fmt::Display for EnrichedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.info.key)
    }
}
