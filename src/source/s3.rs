use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use super::ByteSource;
use crate::s3::S3Client;

/// Reads archives stored as S3 objects (`s3://bucket/key` URLs)
pub struct S3Source {
    client: Arc<S3Client>,
}

impl S3Source {
    pub fn new(client: Arc<S3Client>) -> Self {
        S3Source { client }
    }
}

/// Split `s3://bucket/key` into its bucket and key
pub(crate) fn bucket_and_key(location: &Url) -> Result<(String, String)> {
    let bucket = location
        .host_str()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| anyhow!("S3 location has no bucket: \"{location}\""))?;
    let key = urlencoding::decode(location.path().trim_start_matches('/'))?.into_owned();
    if key.is_empty() {
        return Err(anyhow!("S3 location has no object key: \"{location}\""));
    }
    Ok((bucket.to_string(), key))
}

#[async_trait]
impl ByteSource for S3Source {
    fn name(&self) -> &str {
        "s3"
    }

    fn handles(&self, location: &Url) -> bool {
        location.scheme() == "s3"
    }

    async fn read(&self, location: &Url) -> Result<Bytes> {
        let (bucket, key) = bucket_and_key(location)?;
        let data = self.client.get_object(&bucket, &key).await?;
        debug!(%bucket, %key, bytes = data.len(), "Read S3 archive");
        Ok(data)
    }
}
