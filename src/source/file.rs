use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;
use url::Url;

use super::ByteSource;

/// Reads archives from the local filesystem (`file://` URLs)
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSource;

impl FileSource {
    pub fn new() -> Self {
        FileSource
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn handles(&self, location: &Url) -> bool {
        location.scheme() == "file"
    }

    async fn read(&self, location: &Url) -> Result<Bytes> {
        let path = location
            .to_file_path()
            .map_err(|_| anyhow!("Not a local file URL: \"{location}\""))?;

        let data = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read archive {}", path.display()))?;

        debug!(path = %path.display(), bytes = data.len(), "Read local archive");
        Ok(Bytes::from(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.zip");
        std::fs::write(&path, b"PK\x05\x06").unwrap();

        let location = Url::from_file_path(&path).unwrap();
        let source = FileSource::new();
        assert!(source.handles(&location));
        assert_eq!(&source.read(&location).await.unwrap()[..], b"PK\x05\x06");
    }

    #[tokio::test]
    async fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.zip");
        let location = Url::from_file_path(&path).unwrap();

        let err = FileSource::new().read(&location).await.unwrap_err();
        assert!(err.to_string().contains("missing.zip"));
    }
}
