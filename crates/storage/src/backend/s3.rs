//! S3-compatible object store.
//!
//! Works against AWS S3 and S3-compatible services (Backblaze B2, Tigris,
//! MinIO, ...). Credentials are passed explicitly from configuration.

use crate::{
    ObjectStore,
    backend::BoxSyncRead,
    error::{ErrorKind, Result},
    models::{ListPage, ObjectMeta, ReadHint},
    validate_key, validate_prefix,
};
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, retry::RetryConfig},
    error::{DisplayErrorContext, ProvideErrorMetadata},
    primitives::DateTime,
};
use exn::ResultExt;
use std::io::Cursor;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;
/// S3 refuses pages larger than this.
const MAX_KEYS_PER_PAGE: usize = 1000;

/// Prepend the configured store prefix to a key or listing prefix.
fn full_key(store_prefix: Option<&str>, key: &str) -> String {
    match store_prefix {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
        None => key.to_string(),
    }
}

/// Strip the configured store prefix from a key returned by S3.
fn relative_key<'a>(store_prefix: Option<&str>, key: &'a str) -> &'a str {
    match store_prefix {
        Some(prefix) => key
            .strip_prefix(prefix.trim_end_matches('/'))
            .and_then(|s| s.strip_prefix('/'))
            .unwrap_or(key),
        None => key,
    }
}

/// ETags are stored unquoted; conditional headers want them quoted.
fn quoted_etag(etag: &str) -> String {
    format!("\"{etag}\"")
}

/// S3-compatible object store.
///
/// Keys are relative to the configured bucket prefix, if any. The namespace
/// is the bucket and the connection info is the endpoint, so the same bucket
/// name on two providers never collides in a cache.
///
/// # Examples
///
/// ```no_run
/// use strata_storage::backend::S3Store;
///
/// let store = S3Store::new(
///     "warehouse",
///     "my-bucket",
///     Some("events/".to_string()),
///     "us-west-004",
///     Some("https://s3.us-west-004.backblazeb2.com".to_string()),
///     "access_key_id",
///     "secret_access_key",
/// )?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct S3Store {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    endpoint: String,
    rate_limiter: Arc<Semaphore>,
}

impl S3Store {
    /// Create a new S3 object store.
    ///
    /// # Arguments
    /// * `name` - A name for this store (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - Access key ID
    /// * `key_secret` - Secret access key
    pub fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix.map(|p| validate_key(&p)).transpose()?;
        let region = region.into();
        let credentials = Credentials::new(key_id, key_secret, None, None, "strata-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.clone()))
            // 1 initial attempt + 3 retries with exponential backoff.
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing for S3-compatible services.
            .force_path_style(true);
        if let Some(endpoint_url) = &endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        let endpoint = endpoint.unwrap_or_else(|| format!("s3.{region}.amazonaws.com"));
        Ok(Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket: bucket.into(),
            prefix,
            endpoint,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Acquire a rate limiter permit before making an S3 API call.
    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    fn meta(&self, key: &str, size: Option<i64>, modified: Option<&DateTime>, etag: Option<&str>) -> Result<ObjectMeta> {
        let modified = modified.map(Self::parse_datetime).transpose()?;
        let size = size.unwrap_or_default().max(0) as u64;
        let meta = ObjectMeta::new(relative_key(self.prefix.as_deref(), key), size, modified);
        Ok(match etag {
            Some(etag) => meta.with_etag(etag.trim_matches('"')),
            None => meta,
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.bucket
    }

    fn connection_info(&self) -> &str {
        &self.endpoint
    }

    #[tracing::instrument(skip(self), fields(store = %self.name, bucket = %self.bucket))]
    async fn list_page(&self, prefix: &str, continuation: Option<&str>, max_keys: usize) -> Result<ListPage> {
        let prefix = full_key(self.prefix.as_deref(), &validate_prefix(prefix)?);
        let max_keys = max_keys.clamp(1, MAX_KEYS_PER_PAGE) as i32;
        let _permit = self.acquire_permit().await?;
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(max_keys)
            .set_continuation_token(continuation.map(str::to_string))
            .send()
            .await
            .map_err(|e| ErrorKind::Network(DisplayErrorContext(&e).to_string()))?;
        let objects = output
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                // Directory markers created by some S3 consoles.
                if key.ends_with('/') {
                    return None;
                }
                Some(self.meta(key, object.size(), object.last_modified(), object.e_tag()))
            })
            .collect::<Result<Vec<_>>>()?;
        let continuation = match output.is_truncated() {
            Some(true) => output.next_continuation_token().map(str::to_string),
            _ => None,
        };
        Ok(ListPage { objects, continuation })
    }

    async fn head(&self, key: &str) -> Result<ObjectMeta> {
        let full = full_key(self.prefix.as_deref(), &validate_key(key)?);
        let _permit = self.acquire_permit().await?;
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&full)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_not_found() => ErrorKind::NotFound(key.to_string()),
                _ => ErrorKind::Network(DisplayErrorContext(&e).to_string()),
            })?;
        self.meta(&full, output.content_length(), output.last_modified(), output.e_tag())
    }

    async fn reader(&self, key: &str, hint: ReadHint) -> Result<BoxSyncRead> {
        let full = full_key(self.prefix.as_deref(), &validate_key(key)?);
        let _permit = self.acquire_permit().await?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full)
            .set_if_match(hint.version.as_deref().map(quoted_etag))
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(service) if service.is_no_such_key() => ErrorKind::NotFound(key.to_string()),
                Some(service) if service.code() == Some("PreconditionFailed") => ErrorKind::Modified(key.to_string()),
                _ => ErrorKind::Network(DisplayErrorContext(&e).to_string()),
            })?;
        // The sync readers downstream can't drive the async body, so the
        // object is buffered here.
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| ErrorKind::Network(format!("reading body of {key}: {e}")))?
            .into_bytes();
        tracing::debug!(key, bytes = data.len(), "fetched object");
        Ok(Box::new(Cursor::new(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, "data/a.csv", "data/a.csv")]
    #[case(Some("library"), "data/a.csv", "library/data/a.csv")]
    #[case(Some("library/"), "data/a.csv", "library/data/a.csv")]
    #[case(Some("library"), "", "library/")]
    fn test_full_key(#[case] prefix: Option<&str>, #[case] key: &str, #[case] expected: &str) {
        assert_eq!(full_key(prefix, key), expected);
    }

    #[rstest]
    #[case(None, "data/a.csv", "data/a.csv")]
    #[case(Some("library"), "library/data/a.csv", "data/a.csv")]
    #[case(Some("library/"), "library/data/a.csv", "data/a.csv")]
    #[case(Some("library"), "elsewhere/a.csv", "elsewhere/a.csv")]
    fn test_relative_key(#[case] prefix: Option<&str>, #[case] key: &str, #[case] expected: &str) {
        assert_eq!(relative_key(prefix, key), expected);
    }

    #[rstest]
    #[case("abc123", "\"abc123\"")]
    #[case("d41d8cd98f00b204e9800998ecf8427e-2", "\"d41d8cd98f00b204e9800998ecf8427e-2\"")]
    fn test_quoted_etag(#[case] etag: &str, #[case] expected: &str) {
        assert_eq!(quoted_etag(etag), expected);
    }

    #[tokio::test]
    async fn test_identity_uses_bucket_and_endpoint() {
        let store = S3Store::new("s3", "bucket", None, "us-east-1", Some("http://localhost:9000".into()), "k", "s")
            .unwrap();
        assert_eq!(store.namespace(), "bucket");
        assert_eq!(store.connection_info(), "http://localhost:9000");
        let store = S3Store::new("s3", "bucket", None, "eu-west-1", None, "k", "s").unwrap();
        assert_eq!(store.connection_info(), "s3.eu-west-1.amazonaws.com");
    }
}
