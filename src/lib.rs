//! In-memory archive cache exposing archive contents as a read-only virtual
//! file system addressed by `zipvfs://` URLs.

pub mod archive;
pub mod cache;
pub mod error;
pub mod s3;
pub mod shell;
pub mod source;
pub mod ui;
pub mod vfs;

pub use cache::{ArchiveCache, CacheConfig, CacheStats};
pub use error::{Result, VfsError};
