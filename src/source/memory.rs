use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use url::Url;

use super::ByteSource;

/// Serves archives from memory, keyed by location. Counts reads, which makes
/// it handy for embedding fixtures and for asserting cache behaviour.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    blobs: Arc<RwLock<HashMap<Url, Bytes>>>,
    reads: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the archive bytes for a location
    pub fn insert(&self, location: Url, data: Bytes) {
        if let Ok(mut blobs) = self.blobs.write() {
            blobs.insert(location, data);
        }
    }

    pub fn remove(&self, location: &Url) -> Option<Bytes> {
        self.blobs.write().ok()?.remove(location)
    }

    /// Number of successful and failed reads served so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn handles(&self, location: &Url) -> bool {
        self.blobs
            .read()
            .map(|blobs| blobs.contains_key(location))
            .unwrap_or(false)
    }

    async fn read(&self, location: &Url) -> Result<Bytes> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let blobs = self
            .blobs
            .read()
            .map_err(|_| anyhow!("Memory source lock poisoned"))?;
        blobs
            .get(location)
            .cloned()
            .ok_or_else(|| anyhow!("No archive stored at \"{location}\""))
    }
}
