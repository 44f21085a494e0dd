use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;
use uuid::Uuid;

use crate::vfs::ArchiveReader;

/// What the evictor should do with a handle at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expiry {
    Keep,
    /// Drop the pinned reader but keep the identifier resolvable
    Unpin,
    Remove,
}

/// Cache bookkeeping for one archive.
///
/// The reader is reachable through `reader` for as long as anybody holds it;
/// `pinned` is the cache's own strong reference.
#[derive(Debug)]
pub(crate) struct ArchiveHandle {
    pub id: Uuid,
    pub location: Url,
    reader: Weak<ArchiveReader>,
    pinned: Option<Arc<ArchiveReader>>,
    last_used: Instant,
}

impl ArchiveHandle {
    pub fn new(reader: &Arc<ArchiveReader>, now: Instant) -> Self {
        ArchiveHandle {
            id: reader.id(),
            location: reader.location().clone(),
            reader: Arc::downgrade(reader),
            pinned: Some(Arc::clone(reader)),
            last_used: now,
        }
    }

    /// The reader, if it is still resident
    pub fn reader(&self) -> Option<Arc<ArchiveReader>> {
        self.reader.upgrade()
    }

    pub fn is_live(&self) -> bool {
        self.reader.strong_count() > 0
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned.is_some()
    }

    /// Record a use: refresh the timestamp and pin `reader` again
    pub fn touch(&mut self, reader: &Arc<ArchiveReader>, now: Instant) {
        self.reader = Arc::downgrade(reader);
        self.pinned = Some(Arc::clone(reader));
        self.last_used = now;
    }

    pub fn unpin(&mut self) {
        self.pinned = None;
    }

    /// Next instant at which [`ArchiveHandle::expiry`] may change its answer
    pub fn next_deadline(&self, ttl: Duration, contents_ttl: Option<Duration>) -> Instant {
        match effective_contents_ttl(ttl, contents_ttl) {
            Some(contents) if self.is_pinned() => self.last_used + contents,
            _ => self.last_used + ttl,
        }
    }

    pub fn expiry(&self, now: Instant, ttl: Duration, contents_ttl: Option<Duration>) -> Expiry {
        if now >= self.last_used + ttl {
            return Expiry::Remove;
        }
        match effective_contents_ttl(ttl, contents_ttl) {
            Some(contents) if self.is_pinned() && now >= self.last_used + contents => {
                Expiry::Unpin
            }
            Some(_) => Expiry::Keep,
            // Single-phase: a reader that is gone cannot come back under this id
            None if !self.is_live() => Expiry::Remove,
            None => Expiry::Keep,
        }
    }
}

/// `contents_ttl` only counts when it ends before the handle itself expires
fn effective_contents_ttl(ttl: Duration, contents_ttl: Option<Duration>) -> Option<Duration> {
    contents_ttl.filter(|contents| *contents < ttl)
}
