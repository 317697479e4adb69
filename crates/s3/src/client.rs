//! S3 client implementation
//!
//! Wraps aws-sdk-s3 and implements the ObjectStore trait from s3push-core.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::provider::error::CredentialsError;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, Length};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_smithy_types::error::display::DisplayErrorContext;

use s3push_core::{Error, ObjectInfo, ObjectStore, Result, StoreConfig};

use crate::multipart::{MultipartConfig, calculate_parts, part_byte_range};

/// S3 client wrapper
pub struct S3Client {
    inner: aws_sdk_s3::Client,
    multipart: MultipartConfig,
}

impl S3Client {
    /// Create a new S3 client from the store configuration
    ///
    /// Static credentials are used when both keys are configured, otherwise
    /// the SDK default provider chain (environment, profile, instance
    /// metadata) is consulted at request time.
    pub async fn new(store: StoreConfig) -> Result<Self> {
        store.validate()?;

        let retry = aws_config::retry::RetryConfig::standard()
            .with_max_attempts(store.retry.max_attempts)
            .with_initial_backoff(Duration::from_millis(store.retry.initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(store.retry.max_backoff_ms));

        let timeout = aws_config::timeout::TimeoutConfig::builder()
            .connect_timeout(Duration::from_millis(store.timeout.connect_ms))
            .read_timeout(Duration::from_millis(store.timeout.read_ms))
            .build();

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(store.region.clone()))
            .retry_config(retry)
            .timeout_config(timeout);

        if let Some((access_key, secret_key)) = store.static_credentials() {
            let credentials = aws_credential_types::Credentials::new(
                access_key,
                secret_key,
                None, // session token
                None, // expiry
                "s3push-static-credentials",
            );
            loader = loader.credentials_provider(credentials);
        }

        if let Some(endpoint) = &store.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(store.force_path_style())
            .build();

        tracing::debug!(
            "S3 client ready: endpoint={}, region={}, path_style={}",
            store.endpoint.as_deref().unwrap_or("aws-default"),
            store.region,
            store.force_path_style()
        );

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
            multipart: MultipartConfig::default(),
        })
    }

    /// Override the multipart settings
    pub fn with_multipart(mut self, multipart: MultipartConfig) -> Self {
        self.multipart = multipart;
        self
    }

    async fn put_single(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
    ) -> Result<Option<String>> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| body_error(local_path, e))?;

        let response = self
            .inner
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .set_content_type(content_type)
            .send()
            .await
            .map_err(map_sdk_error)?;

        Ok(response.e_tag().map(trim_etag))
    }

    async fn put_multipart(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        size: u64,
        content_type: Option<String>,
    ) -> Result<Option<String>> {
        let created = self
            .inner
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .set_content_type(content_type)
            .send()
            .await
            .map_err(map_sdk_error)?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| Error::General("Store returned no multipart upload id".into()))?
            .to_string();

        let parts = match self
            .upload_parts(local_path, bucket, key, &upload_id, size)
            .await
        {
            Ok(parts) => parts,
            Err(err) => {
                self.abort_multipart(bucket, key, &upload_id).await;
                return Err(err);
            }
        };

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        let response = match self
            .inner
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                self.abort_multipart(bucket, key, &upload_id).await;
                return Err(map_sdk_error(err));
            }
        };

        Ok(response.e_tag().map(trim_etag))
    }

    async fn upload_parts(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        upload_id: &str,
        size: u64,
    ) -> Result<Vec<CompletedPart>> {
        let part_size = self.multipart.calculate_part_size(size);
        let count = calculate_parts(size, part_size);
        tracing::debug!("Uploading {key} in {count} part(s) of {part_size} bytes");

        let mut parts = Vec::with_capacity(count as usize);
        for part_number in 1..=count as i32 {
            let (start, end) = part_byte_range(part_number, part_size, size);
            let body = ByteStream::read_from()
                .path(local_path)
                .offset(start)
                .length(Length::Exact(end - start))
                .build()
                .await
                .map_err(|e| body_error(local_path, e))?;

            let response = self
                .inner
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .map_err(map_sdk_error)?;

            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .set_e_tag(response.e_tag().map(str::to_string))
                    .build(),
            );
        }

        Ok(parts)
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) {
        if let Err(e) = self
            .inner
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(
                "Failed to abort multipart upload {upload_id} for {key}: {}",
                DisplayErrorContext(&e)
            );
        }
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put_object(
        &self,
        local_path: &Path,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
    ) -> Result<ObjectInfo> {
        let size = std::fs::metadata(local_path)?.len();

        let etag = if self.multipart.use_multipart(size) {
            self.put_multipart(local_path, bucket, key, size, content_type.clone())
                .await?
        } else {
            self.put_single(local_path, bucket, key, content_type.clone())
                .await?
        };

        let mut info = ObjectInfo::file(key, size);
        info.etag = etag;
        info.content_type = content_type;
        Ok(info)
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.inner.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(e)) if e.err().is_not_found() => Ok(false),
            Err(e) => Err(map_sdk_error(e)),
        }
    }
}

fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

/// Error for a request body that could not be built from a local file
fn body_error(local_path: &Path, err: impl std::fmt::Display) -> Error {
    if local_path.exists() {
        Error::General(format!("Failed to read {}: {err}", local_path.display()))
    } else {
        Error::NotFound(local_path.display().to_string())
    }
}

/// Map an SDK error into the core error taxonomy
///
/// Service responses keep their code and message verbatim. Failures before a
/// response is received are either credential resolution problems or
/// transport problems.
fn map_sdk_error<E, R>(err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    if let SdkError::ServiceError(service) = &err {
        let inner = service.err();
        return Error::Remote {
            code: inner.code().unwrap_or("Unknown").to_string(),
            message: inner
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
        };
    }

    let detail = DisplayErrorContext(&err).to_string();
    if caused_by_credentials(&err) {
        return Error::Auth(detail);
    }

    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            Error::Network(detail)
        }
        _ => Error::General(detail),
    }
}

/// Whether a credential provider failure is anywhere in the source chain
fn caused_by_credentials(err: &(dyn std::error::Error + 'static)) -> bool {
    std::iter::successors(Some(err), |e| e.source())
        .any(|e| e.downcast_ref::<CredentialsError>().is_some())
}
