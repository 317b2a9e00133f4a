//! S3-compatible object store.
//!
//! This module provides an object store implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), and others.
//!
//! # Credentials
//!
//! Credentials are provided explicitly via the configuration file; there is
//! no credential chain lookup.

use crate::acl::{Grant, Grantee, GranteeKind, Permission};
use crate::backend::PageStream;
use crate::error::{ErrorKind, Result};
use crate::models::{ListOptions, ObjectInfo, ObjectMetadata, Page};
use crate::ObjectStore;
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::DateTime,
    types,
};
use exn::ResultExt;
use time::OffsetDateTime;

/// S3-compatible object store.
///
/// The SDK's own retries are switched off: a failed request fails the item
/// it was made for, and nothing tries it again.
///
/// # Examples
///
/// ```no_run
/// use bucketfan_storage::backend::S3Store;
///
/// let store = S3Store::new(
///     "my-storage",
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com"),
///     "access_key_id",
///     "secret_access_key",
/// );
/// ```
#[derive(Debug, Clone)]
pub struct S3Store {
    name: String,
    client: Client,
}

impl S3Store {
    /// Create a new S3 object store.
    ///
    /// # Arguments
    /// * `name` - A name for this store (used in display/logging)
    /// * `region` - AWS region or provider-specific region (e.g., "us-west-004" for Backblaze)
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - AWS/provider access key ID
    /// * `key_secret` - AWS/provider secret access key
    pub fn new(
        name: impl Into<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        let credentials = Credentials::new(key_id, key_secret, None, None, "bucketfan-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            .retry_config(RetryConfig::disabled())
            // Use path-style addressing for better compatibility with
            // S3-compatible services (Backblaze, MinIO, etc.)
            .force_path_style(true);
        // Set custom endpoint for non-AWS services
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Self::from_client(name, Client::from_conf(config_builder.build()))
    }

    /// Wrap an already configured client.
    pub fn from_client(name: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    /// Map an SDK failure onto our error categories, keeping the SDK error
    /// as the source of the raised error.
    fn map_sdk_error<E, R>(err: SdkError<E, R>, target: &str) -> crate::error::Error
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug + Send + Sync + 'static,
    {
        let target = target.to_string();
        let kind = match &err {
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
                ErrorKind::Network(DisplayErrorContext(&err).to_string())
            },
            _ => match err.code() {
                Some("AccessDenied" | "AllAccessDisabled") => ErrorKind::PermissionDenied(target),
                Some("NoSuchKey" | "NoSuchBucket" | "NotFound") => ErrorKind::NotFound(target),
                _ => ErrorKind::BackendError(DisplayErrorContext(&err).to_string()),
            },
        };
        exn::Exn::from(err).raise(kind)
    }

    /// Convert AWS DateTime to OffsetDateTime.
    fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::InvalidData("S3 datetime out of range".to_string()))
    }

    fn object_info(object: &types::Object) -> Option<ObjectInfo> {
        let key = object.key().filter(|key| !key.is_empty())?;
        let size = object.size().and_then(|size| u64::try_from(size).ok()).unwrap_or(0);
        let mut info = ObjectInfo::new(key, size);
        if let Some(etag) = object.e_tag() {
            info = info.with_etag(etag);
        }
        // A timestamp we can't represent isn't worth dropping the object for.
        if let Some(last_modified) = object.last_modified().and_then(|dt| Self::parse_datetime(dt).ok()) {
            info = info.with_last_modified(last_modified);
        }
        Some(info)
    }

    fn grant(grant: &types::Grant) -> Option<Grant> {
        let grantee = grant.grantee()?;
        let kind = match grantee.r#type() {
            types::Type::Group => GranteeKind::Group,
            types::Type::AmazonCustomerByEmail => GranteeKind::User,
            types::Type::CanonicalUser => GranteeKind::Canonical,
            other => GranteeKind::Other(other.as_str().to_string()),
        };
        let permission = match grant.permission() {
            Some(types::Permission::FullControl) => Permission::FullControl,
            Some(types::Permission::Read) => Permission::Read,
            Some(types::Permission::ReadAcp) => Permission::ReadAcp,
            Some(types::Permission::Write) => Permission::Write,
            Some(types::Permission::WriteAcp) => Permission::WriteAcp,
            Some(other) => Permission::Other(other.as_str().to_string()),
            None => Permission::Other(String::new()),
        };
        Some(Grant::new(
            Grantee {
                kind,
                id: grantee.id().map(str::to_string),
                uri: grantee.uri().map(str::to_string),
                display_name: grantee.display_name().map(str::to_string),
            },
            permission,
        ))
    }

    fn max_keys(options: &ListOptions) -> Option<i32> {
        options.page_size.map(|size| i32::try_from(size).unwrap_or(i32::MAX))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self, options: &ListOptions) -> Result<bool> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&options.bucket)
            .set_prefix(options.prefix.clone())
            .max_keys(1)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, &options.bucket))?;
        Ok(!response.contents().is_empty())
    }

    fn list_pages<'a>(&'a self, options: &'a ListOptions) -> PageStream<'a> {
        Box::pin(stream! {
            let mut continuation_token: Option<String> = None;
            loop {
                let response = self
                    .client
                    .list_objects_v2()
                    .bucket(&options.bucket)
                    .set_prefix(options.prefix.clone())
                    .set_max_keys(Self::max_keys(options))
                    .set_continuation_token(continuation_token.take())
                    .send()
                    .await;
                let response = match response {
                    Ok(response) => response,
                    Err(e) => {
                        yield Err(Self::map_sdk_error(e, &options.bucket));
                        return;
                    },
                };
                tracing::debug!(
                    store = %self.name,
                    bucket = %options.bucket,
                    objects = response.contents().len(),
                    "Listed page"
                );
                yield Ok(response.contents().iter().filter_map(Self::object_info).collect::<Page>());
                match (response.is_truncated(), response.next_continuation_token()) {
                    (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                    _ => break,
                }
            }
        })
    }

    async fn metadata(&self, bucket: &str, key: &str) -> Result<ObjectMetadata> {
        let target = format!("{bucket}/{key}");
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, &target))?;
        Ok(ObjectMetadata {
            key: key.to_string(),
            size: response.content_length().and_then(|size| u64::try_from(size).ok()).unwrap_or(0),
            content_type: response.content_type().map(str::to_string),
            etag: response.e_tag().map(str::to_string),
            last_modified: response.last_modified().map(Self::parse_datetime).transpose()?,
        })
    }

    async fn acl(&self, bucket: &str, key: &str) -> Result<Vec<Grant>> {
        let target = format!("{bucket}/{key}");
        let response = self
            .client
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, &target))?;
        Ok(response.grants().iter().filter_map(Self::grant).collect())
    }
}
