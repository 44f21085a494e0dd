mod file;
mod memory;
mod s3;

pub use file::FileSource;
pub use memory::MemorySource;
pub use s3::S3Source;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Reads the raw bytes of an archive from wherever it lives
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Whether this source knows how to read `location`
    fn handles(&self, location: &Url) -> bool;

    /// Read the complete archive at `location`
    async fn read(&self, location: &Url) -> Result<Bytes>;
}

/// Dispatches reads to the first registered source that handles the location
pub struct RoutingSource {
    sources: Vec<Arc<dyn ByteSource>>,
}

impl RoutingSource {
    /// A router that reads local files only
    pub fn new() -> Self {
        Self {
            sources: vec![Arc::new(FileSource::new())],
        }
    }

    /// Add a source; earlier registrations win
    pub fn register(mut self, source: Arc<dyn ByteSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// List registered source names
    pub fn list(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

impl Default for RoutingSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ByteSource for RoutingSource {
    fn name(&self) -> &str {
        "router"
    }

    fn handles(&self, location: &Url) -> bool {
        self.sources.iter().any(|s| s.handles(location))
    }

    async fn read(&self, location: &Url) -> Result<Bytes> {
        let source = self
            .sources
            .iter()
            .find(|s| s.handles(location))
            .ok_or_else(|| anyhow!("No byte source can read \"{location}\""))?;
        source.read(location).await
    }
}

/// Turn a CLI argument (local path, `file://` or `s3://` URL) into a location URL
pub fn location_from_arg(arg: &str) -> Result<Url> {
    // Single-letter schemes are Windows drive letters, not URLs
    if let Ok(url) = Url::parse(arg) {
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }

    let path = Path::new(arg);
    let absolute = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve path {}", path.display()))?;
    Url::from_file_path(&absolute)
        .map_err(|_| anyhow!("Cannot express {} as a file URL", absolute.display()))
}
