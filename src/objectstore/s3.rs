//! `aws-sdk-s3`-backed implementation, targeting an S3-compatible endpoint
//! (AWS or self-hosted, e.g. MinIO) the same way `sui-data-ingestion` talks
//! to its archival buckets.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::Client;

use crate::error::{CoreError, CoreResult};

use super::{ObjectStore, CONTENT_TYPE_GZIP};

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    presign_ttl: Duration,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>, presign_ttl: Duration) -> Self {
        S3ObjectStore {
            client,
            bucket: bucket.into(),
            presign_ttl,
        }
    }

    pub async fn from_config(
        region: String,
        endpoint: Option<String>,
        access_key: String,
        secret_key: String,
        bucket: impl Into<String>,
        presign_ttl: Duration,
    ) -> anyhow::Result<Self> {
        let credentials = aws_sdk_s3::config::Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "archive-swarm-coordinator",
        );
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region))
            .credentials_provider(credentials);
        if let Some(endpoint) = endpoint {
            config_loader = config_loader.endpoint_url(endpoint);
        }
        let shared_config = config_loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
            .force_path_style(true)
            .build();
        let client = Client::from_conf(s3_config);
        Ok(Self::new(client, bucket, presign_ttl))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_put(&self, object_key: &str, content_length: i64) -> CoreResult<String> {
        let presigning_config = PresigningConfig::expires_in(self.presign_ttl)
            .map_err(|err| CoreError::Internal(anyhow::anyhow!(err)))?;

        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .content_length(content_length)
            .content_type(CONTENT_TYPE_GZIP)
            .presigned(presigning_config)
            .await
            .map_err(|err| CoreError::Internal(anyhow::anyhow!(err)))?;

        Ok(presigned.uri().to_string())
    }

    async fn head_size(&self, object_key: &str) -> CoreResult<i64> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(object_key)
            .send()
            .await
            .map_err(|err| {
                CoreError::Internal(anyhow::anyhow!(
                    "HEAD {object_key} failed: {err}"
                ))
            })?;

        head.content_length()
            .ok_or_else(|| CoreError::Internal(anyhow::anyhow!("object has no content-length")))
    }
}
