//! S3-backed blob store.
//!
//! Credentials come from the standard AWS provider chain; the endpoint can be
//! overridden for MinIO and other S3-compatible services.

use crate::blob_store::BlobStore;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::types::BlobMetadata;
use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

/// S3 storage for the registry ciphertext and the key envelope.
pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Builds a client from the default provider chain plus config overrides.
    pub async fn from_config(config: &RegistryConfig) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_types::region::Region::new(config.s3_region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(ref endpoint) = config.s3_endpoint_override {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::new(S3Client::from_conf(builder.build()), config.s3_bucket.clone())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, key: &str) -> RegistryResult<Option<Vec<u8>>> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    debug!("s3://{}/{key} not found", self.bucket);
                    return Ok(None);
                }
                return Err(RegistryError::UpstreamUnavailable(format!(
                    "download failed for {key}: {service_err}"
                )));
            }
        };

        let body = resp.body.collect().await.map_err(|e| {
            RegistryError::UpstreamUnavailable(format!("failed to read body for {key}: {e}"))
        })?;

        let bytes = body.into_bytes().to_vec();
        debug!(
            "downloaded {} bytes from s3://{}/{key}",
            bytes.len(),
            self.bucket
        );
        Ok(Some(bytes))
    }

    async fn set(&self, key: &str, data: Vec<u8>, metadata: BlobMetadata) -> RegistryResult<()> {
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(&metadata.content_type)
            .metadata("content-hash", &metadata.content_hash)
            .metadata("format", &metadata.format)
            .metadata("written-at", metadata.written_at.to_rfc3339())
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| RegistryError::UpstreamUnavailable(format!("upload failed for {key}: {e}")))?;

        debug!("uploaded {size} bytes to s3://{}/{key}", self.bucket);
        Ok(())
    }
}
