use super::{expiry_from_now, AccessUrlIssuer, ObjectStore, ObjectVisibility, PresignedUrl, StorageError};
use crate::config::S3Config;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Build an S3 client honouring custom endpoints (MinIO, LocalStack)
pub async fn build_client(config: &S3Config) -> S3Client {
    let aws_config = aws_config::defaults(BehaviorVersion::latest())
        .region(aws_config::Region::new(config.region.clone()))
        .load()
        .await;

    let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

    if let Some(ref endpoint_url) = config.endpoint_url {
        s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
    }

    // Required for MinIO
    if config.force_path_style {
        s3_config_builder = s3_config_builder.force_path_style(true);
    }

    S3Client::from_conf(s3_config_builder.build())
}

/// S3 bucket holding image blobs
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();

        info!(bucket = %bucket, "S3 object store initialized");

        Self { client, bucket }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, body), fields(bucket = %self.bucket, size_bytes = body.len()))]
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
        visibility: ObjectVisibility,
    ) -> Result<(), StorageError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type);

        if visibility == ObjectVisibility::PublicRead {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }

        request.send().await.map_err(|e| StorageError::Backend {
            operation: "put_object",
            message: DisplayErrorContext(&e).to_string(),
        })?;

        debug!(key = %key, "Object written to S3");
        Ok(())
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        // S3 reports success for keys that do not exist.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Backend {
                operation: "delete_object",
                message: DisplayErrorContext(&e).to_string(),
            })?;

        debug!(key = %key, "Object deleted from S3");
        Ok(())
    }
}

/// Presigned GET URL issuer backed by the S3 client credentials
pub struct S3UrlIssuer {
    client: S3Client,
}

impl S3UrlIssuer {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccessUrlIssuer for S3UrlIssuer {
    #[instrument(skip(self))]
    async fn issue(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        let presigning_config = PresigningConfig::expires_in(ttl).map_err(|e| {
            StorageError::Signing(format!("Failed to create presigning config: {}", e))
        })?;

        let expires_at = expiry_from_now(ttl)?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|e| {
                StorageError::Signing(format!(
                    "Failed to generate presigned URL: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(PresignedUrl {
            url: presigned.uri().to_string(),
            expires_at,
        })
    }
}
