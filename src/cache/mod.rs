//! Archive cache keyed by source location and virtual archive id.
//!
//! Each cached archive gets a handle holding a weak reference to its
//! [`ArchiveReader`] plus a pinned strong one. A single tokio task sleeps
//! until the earliest handle deadline, unpins or removes what expired and
//! reschedules itself.

mod handle;
mod stats;

pub use stats::CacheStats;

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::archive::{ArchiveCodec, FormatCodec};
use crate::error::{Result, VfsError};
use crate::source::{ByteSource, RoutingSource};
use crate::vfs::{self, ArchiveReader, DirectoryEntry};
use handle::{ArchiveHandle, Expiry};
use stats::CacheCounters;

/// Cache settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Label used in log lines
    pub name: String,
    /// How long a handle survives without use. Zero keeps handles until `clear()`
    pub ttl: Duration,
    /// How long the cache keeps the decoded reader pinned. Only applies when
    /// shorter than `ttl`; the archive id stays resolvable after unpinning and
    /// the next access reloads under the same id
    pub contents_ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            name: "zipvfs".to_string(),
            ttl: Duration::from_millis(60_000),
            contents_ttl: None,
        }
    }
}

/// In-memory cache of decoded archives, addressed by source location or by
/// `zipvfs://<id>/<path>` virtual URLs.
///
/// Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct ArchiveCache {
    inner: Arc<Inner>,
}

struct Inner {
    config: CacheConfig,
    source: Arc<dyn ByteSource>,
    codec: Arc<dyn ArchiveCodec>,
    handles: Mutex<HashMap<Uuid, ArchiveHandle>>,
    /// One async lock per location currently being loaded
    loading: Mutex<HashMap<Url, Arc<AsyncMutex<()>>>>,
    evictor: Mutex<Option<Evictor>>,
    counters: CacheCounters,
}

struct Evictor {
    deadline: Instant,
    task: JoinHandle<()>,
}

/// What a request URL points at
enum Target {
    Virtual { id: Uuid, path: String },
    Location(Url),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        return Err(VfsError::Aborted);
    }
    Ok(())
}

impl Target {
    fn classify(url: &Url) -> Result<Self> {
        if !vfs::is_virtual(url) {
            return Ok(Target::Location(url.clone()));
        }
        let id = vfs::archive_id(url).ok_or_else(|| VfsError::CacheMiss { url: url.clone() })?;
        let path = vfs::in_archive_path(url).ok_or_else(|| VfsError::not_found(url.path()))?;
        Ok(Target::Virtual { id, path })
    }
}

impl ArchiveCache {
    /// A cache reading local files through [`RoutingSource`] and decoding with [`FormatCodec`]
    pub fn new(config: CacheConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(RoutingSource::new()),
            Arc::new(FormatCodec::new()),
        )
    }

    pub fn with_collaborators(
        config: CacheConfig,
        source: Arc<dyn ByteSource>,
        codec: Arc<dyn ArchiveCodec>,
    ) -> Self {
        ArchiveCache {
            inner: Arc::new(Inner {
                config,
                source,
                codec,
                handles: Mutex::new(HashMap::new()),
                loading: Mutex::new(HashMap::new()),
                evictor: Mutex::new(None),
                counters: CacheCounters::default(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// List a directory. A source location lists the archive root.
    pub async fn list_directory(
        &self,
        url: &Url,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<DirectoryEntry>> {
        let (reader, path) = self.resolve(url, cancel).await?;
        reader.list_directory(&path)
    }

    pub async fn read_binary(
        &self,
        url: &Url,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes> {
        let (reader, path) = self.resolve(url, cancel).await?;
        reader.read_binary(&path).await
    }

    pub async fn read_text(&self, url: &Url, cancel: Option<&CancellationToken>) -> Result<String> {
        let (reader, path) = self.resolve(url, cancel).await?;
        reader.read_text(&path).await
    }

    /// Load (or find) the archive at `location` and return its virtual root URL
    pub async fn open(&self, location: &Url, cancel: Option<&CancellationToken>) -> Result<Url> {
        let (reader, _) = self.resolve(location, cancel).await?;
        vfs::virtual_url(&reader.id(), "").map_err(|err| VfsError::Load(err.into()))
    }

    /// Drop every handle and stop the eviction task
    pub fn clear(&self) {
        let removed = {
            let mut handles = lock(&self.inner.handles);
            let removed = handles.len();
            handles.clear();
            removed
        };
        if let Some(evictor) = lock(&self.inner.evictor).take() {
            evictor.task.abort();
        }
        info!(cache = %self.name(), removed, "Cleared archive cache");
    }

    pub fn stats(&self) -> CacheStats {
        let (handles, live) = {
            let handles = lock(&self.inner.handles);
            let live = handles.values().filter(|h| h.is_live()).count();
            (handles.len(), live)
        };
        self.inner.counters.snapshot(handles, live)
    }

    /// Number of handles, including ones whose reader was released
    pub fn len(&self) -> usize {
        lock(&self.inner.handles).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find or load the reader for `url` and the in-archive path it addresses
    async fn resolve(
        &self,
        url: &Url,
        cancel: Option<&CancellationToken>,
    ) -> Result<(Arc<ArchiveReader>, String)> {
        check_cancelled(cancel)?;

        let (reader, path) = match Target::classify(url)? {
            Target::Virtual { id, path } => {
                let reader = match self.inner.lookup_id(&id) {
                    Some((_, Some(reader))) => {
                        self.inner.counters.record_hit();
                        reader
                    }
                    Some((location, None)) => self.load(&location, Some(id), url).await?,
                    None => {
                        self.inner.counters.record_miss();
                        debug!(cache = %self.name(), %url, "Unknown archive id");
                        return Err(VfsError::CacheMiss { url: url.clone() });
                    }
                };
                (reader, path)
            }
            Target::Location(location) => {
                let reader = match self.inner.lookup_location(&location) {
                    Some((_, Some(reader))) => {
                        self.inner.counters.record_hit();
                        reader
                    }
                    _ => self.load(&location, None, url).await?,
                };
                (reader, "/".to_string())
            }
        };

        self.touch(&reader);
        Ok((reader, path))
    }

    /// Load under the per-location lock so concurrent misses share one load
    async fn load(
        &self,
        location: &Url,
        expected: Option<Uuid>,
        requested: &Url,
    ) -> Result<Arc<ArchiveReader>> {
        let gate = self.inner.gate(location);
        let result = {
            let _guard = gate.lock().await;
            self.load_locked(location, expected, requested).await
        };
        self.inner.release_gate(location, &gate);
        result
    }

    async fn load_locked(
        &self,
        location: &Url,
        expected: Option<Uuid>,
        requested: &Url,
    ) -> Result<Arc<ArchiveReader>> {
        // Whoever held the lock before us may have loaded or evicted it
        let id = match (self.inner.lookup_location(location), expected) {
            (Some((id, _)), Some(expected)) if id != expected => {
                self.inner.counters.record_miss();
                return Err(VfsError::CacheMiss {
                    url: requested.clone(),
                });
            }
            (Some((_, Some(reader))), _) => {
                self.inner.counters.record_hit();
                return Ok(reader);
            }
            (Some((id, None)), _) => id,
            (None, Some(_)) => {
                self.inner.counters.record_miss();
                return Err(VfsError::CacheMiss {
                    url: requested.clone(),
                });
            }
            (None, None) => Uuid::new_v4(),
        };

        self.inner.counters.record_miss();
        info!(cache = %self.name(), %id, %location, "Loading archive");

        let reader = ArchiveReader::load(
            id,
            location.clone(),
            self.inner.source.as_ref(),
            Arc::clone(&self.inner.codec),
        )
        .await
        .map_err(|err| {
            warn!(cache = %self.name(), %location, error = %err, "Failed to load archive");
            VfsError::Load(err)
        })?;

        let reader = Arc::new(reader);
        self.inner.counters.record_load();
        lock(&self.inner.handles).insert(id, ArchiveHandle::new(&reader, Instant::now()));
        Ok(reader)
    }

    fn touch(&self, reader: &Arc<ArchiveReader>) {
        if let Some(handle) = lock(&self.inner.handles).get_mut(&reader.id()) {
            handle.touch(reader, Instant::now());
        }
        Inner::schedule_eviction(&self.inner);
    }
}

impl Inner {
    fn lookup_id(&self, id: &Uuid) -> Option<(Url, Option<Arc<ArchiveReader>>)> {
        lock(&self.handles)
            .get(id)
            .map(|handle| (handle.location.clone(), handle.reader()))
    }

    fn lookup_location(&self, location: &Url) -> Option<(Uuid, Option<Arc<ArchiveReader>>)> {
        lock(&self.handles)
            .values()
            .find(|handle| &handle.location == location)
            .map(|handle| (handle.id, handle.reader()))
    }

    fn gate(&self, location: &Url) -> Arc<AsyncMutex<()>> {
        let mut loading = lock(&self.loading);
        Arc::clone(loading.entry(location.clone()).or_default())
    }

    /// Forget the lock once no other request is waiting on it
    fn release_gate(&self, location: &Url, gate: &Arc<AsyncMutex<()>>) {
        let mut loading = lock(&self.loading);
        // One reference in the map, one held by the caller
        if Arc::strong_count(gate) <= 2 {
            loading.remove(location);
        }
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        let (ttl, contents_ttl) = (self.config.ttl, self.config.contents_ttl);
        lock(&self.handles)
            .values()
            .map(|handle| handle.next_deadline(ttl, contents_ttl))
            .min()
    }

    /// Make sure a task is armed for the earliest deadline
    fn schedule_eviction(inner: &Arc<Inner>) {
        if inner.config.ttl.is_zero() {
            return;
        }
        let Some(deadline) = inner.earliest_deadline() else {
            return;
        };

        let mut slot = lock(&inner.evictor);
        if let Some(current) = slot.as_ref() {
            if !current.task.is_finished() && current.deadline <= deadline {
                return;
            }
            current.task.abort();
        }

        let weak = Arc::downgrade(inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = weak.upgrade() {
                Inner::run_eviction(&inner);
            }
        });
        *slot = Some(Evictor { deadline, task });
    }

    fn run_eviction(inner: &Arc<Inner>) {
        // Detach ourselves so rescheduling does not see a stale deadline
        lock(&inner.evictor).take();
        let evicted = inner.sweep(Instant::now());
        if evicted > 0 {
            inner.counters.record_evictions(evicted);
        }
        Inner::schedule_eviction(inner);
    }

    /// Unpin or remove expired handles, returning how many were removed
    fn sweep(&self, now: Instant) -> usize {
        let (ttl, contents_ttl) = (self.config.ttl, self.config.contents_ttl);
        let mut handles = lock(&self.handles);
        let before = handles.len();

        handles.retain(|id, handle| match handle.expiry(now, ttl, contents_ttl) {
            Expiry::Keep => true,
            Expiry::Unpin => {
                debug!(cache = %self.config.name, %id, "Releasing archive contents");
                handle.unpin();
                true
            }
            Expiry::Remove => {
                debug!(cache = %self.config.name, %id, location = %handle.location, "Evicting archive");
                false
            }
        });

        before - handles.len()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let slot = self.evictor.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(evictor) = slot.take() {
            evictor.task.abort();
        }
    }
}

impl std::fmt::Debug for ArchiveCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveCache")
            .field("config", &self.inner.config)
            .field("handles", &self.len())
            .finish()
    }
}
