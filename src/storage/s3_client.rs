//! S3-compatible storage client
//!
//! Wraps the AWS SDK for S3-compatible storage access.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    primitives::ByteStream,
    Client,
};
use chrono::DateTime;

use crate::config::StorageConfig;
use crate::error::StorageError;

use super::types::{ObjectLocation, ObjectMetadata, StorageObject};
use super::ObjectStore;

/// S3-compatible storage client
#[derive(Clone)]
pub struct S3Client {
    client: Client,
    region: String,
    /// `Some(endpoint)` for path-style providers, `None` for AWS virtual-hosted URLs
    path_style_endpoint: Option<String>,
}

impl S3Client {
    /// Create a new S3 client from configuration
    pub async fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "coloring-book-server",
        );

        let region = config
            .region
            .clone()
            .unwrap_or_else(|| "us-east-1".to_string());

        let path_style = config.provider.uses_path_style();

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.clone()))
            .credentials_provider(credentials)
            .force_path_style(path_style); // Required for MinIO and other S3-compatible services

        if path_style {
            builder = builder.endpoint_url(&config.endpoint);
        }

        let client = Client::from_conf(builder.build());

        // Test connection by checking if bucket exists
        let bucket = &config.bucket;
        match client.head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                tracing::info!("Connected to S3 bucket: {}", bucket);
            }
            Err(e) => {
                tracing::warn!(
                    "Could not verify bucket {}: {}. Will attempt operations anyway.",
                    bucket,
                    DisplayErrorContext(&e)
                );
            }
        }

        Ok(Self {
            client,
            region,
            path_style_endpoint: path_style
                .then(|| config.endpoint.trim_end_matches('/').to_string()),
        })
    }

    /// Public URL of an object
    pub fn object_url(&self, location: &ObjectLocation) -> String {
        object_url(self.path_style_endpoint.as_deref(), &self.region, location)
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn get_object(&self, location: &ObjectLocation) -> Result<StorageObject, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, location))?;

        let metadata = ObjectMetadata {
            key: location.key.clone(),
            size: response.content_length().unwrap_or(0),
            last_modified: response
                .last_modified()
                .and_then(|dt| DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())),
            content_type: response.content_type().map(|s| s.to_string()),
            etag: response.e_tag().map(|s| s.to_string()),
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::SdkError(format!("Failed to read object body: {}", e)))?
            .into_bytes()
            .to_vec();

        tracing::debug!(bucket = %location.bucket, key = %location.key, size = data.len(), "Fetched object");

        Ok(StorageObject { metadata, data })
    }

    async fn put_object(
        &self,
        location: &ObjectLocation,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, location))?;

        tracing::info!(bucket = %location.bucket, key = %location.key, size, "Stored object");

        Ok(self.object_url(location))
    }

    async fn delete_object(&self, location: &ObjectLocation) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(e, location))?;
        Ok(())
    }
}

/// Build the public URL for an object.
///
/// Path-style providers get `<endpoint>/<bucket>/<key>`; AWS gets the
/// virtual-hosted `https://<bucket>.s3.<region>.amazonaws.com/<key>`.
fn object_url(path_style_endpoint: Option<&str>, region: &str, location: &ObjectLocation) -> String {
    match path_style_endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint, location.bucket, location.encoded_key()),
        None => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            location.bucket,
            region,
            location.encoded_key()
        ),
    }
}

/// Map an SDK failure onto the storage error taxonomy
fn classify_sdk_error<E, R>(err: SdkError<E, R>, location: &ObjectLocation) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    if matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) {
        return StorageError::ConnectionFailed(format!("{}: {}", location, DisplayErrorContext(&err)));
    }

    match err.code() {
        Some("NoSuchKey") | Some("NotFound") => StorageError::ObjectNotFound(location.to_string()),
        Some("NoSuchBucket") => StorageError::BucketNotFound(location.bucket.clone()),
        Some("AccessDenied") | Some("Forbidden") => StorageError::AccessDenied(location.to_string()),
        _ => StorageError::SdkError(format!("{}: {}", location, DisplayErrorContext(&err))),
    }
}
