//! Error types for archive cache lookups

use thiserror::Error;
use url::Url;

/// Failures surfaced by [`ArchiveCache`](crate::cache::ArchiveCache) and
/// [`ArchiveReader`](crate::vfs::ArchiveReader).
#[derive(Debug, Error)]
pub enum VfsError {
    /// The path has no entry in the loaded archive's index
    #[error("There is no file at path \"{path}\" in zip file")]
    NotFound { path: String },

    /// The virtual URL's archive identifier is not cached (evicted, cleared or never loaded)
    #[error("Could not find zip file at \"{url}\"")]
    CacheMiss { url: Url },

    /// Reading or decoding the archive failed; the underlying error is passed through as-is
    #[error(transparent)]
    Load(anyhow::Error),

    /// An index entry lacks the data needed to serve the request
    #[error("Entry at path \"{path}\" in zip file cannot be read: {reason}")]
    InternalConsistency { path: String, reason: &'static str },

    /// Cancellation was requested before the operation started
    #[error("Operation was aborted")]
    Aborted,

    #[error("File at path \"{path}\" in zip file is not valid UTF-8")]
    InvalidUtf8 {
        path: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

impl VfsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        VfsError::NotFound { path: path.into() }
    }

    /// True for the errors that mean "this address points at nothing right now"
    pub fn is_missing(&self) -> bool {
        matches!(self, VfsError::NotFound { .. } | VfsError::CacheMiss { .. })
    }
}

pub type Result<T> = std::result::Result<T, VfsError>;
