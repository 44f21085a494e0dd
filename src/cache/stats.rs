//! Counters for cache activity.
//!
//! Hits, misses, loads and evictions are tracked with relaxed atomics and
//! read back as a [`CacheStats`] snapshot together with the handle counts.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Handles currently held, live or not
    pub handles: usize,
    /// Handles whose reader is still resident
    pub live_readers: usize,
    /// Requests answered by an already loaded reader
    pub hits: u64,
    /// Requests that had to load, or named an unknown archive
    pub misses: u64,
    /// Successful archive loads
    pub loads: u64,
    /// Handles removed by the evictor
    pub evictions: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} handle(s), {} live | {} hit(s), {} miss(es), {} load(s), {} eviction(s)",
            self.handles, self.live_readers, self.hits, self.misses, self.loads, self.evictions
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    evictions: AtomicU64,
}

impl CacheCounters {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Combine the counters with handle counts taken under the map lock
    pub fn snapshot(&self, handles: usize, live_readers: usize) -> CacheStats {
        CacheStats {
            handles,
            live_readers,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
