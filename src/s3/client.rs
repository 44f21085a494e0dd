use anyhow::{Context, Result};
use aws_sdk_s3::Client;
use bytes::Bytes;

/// Wrapper around AWS S3 client
pub struct S3Client {
    client: Client,
}

impl S3Client {
    /// Create a new S3 client using default AWS configuration
    pub async fn new() -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Ok(S3Client {
            client: Client::new(&config),
        })
    }

    /// Wrap an already configured SDK client (custom endpoints, tests)
    pub fn from_client(client: Client) -> Self {
        S3Client { client }
    }

    /// Get an entire object's contents
    pub async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get object s3://{bucket}/{key}"))?;

        let bytes = resp
            .body
            .collect()
            .await
            .context("Failed to read object body")?
            .into_bytes();

        Ok(bytes)
    }
}
