use anyhow::Context;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::node::{ContentsIndex, DirectoryEntry, EntrySource, extend_entry, synthesize_missing_directories};
use super::path::{ArchivePath, split_path};
use crate::archive::ArchiveCodec;
use crate::error::{Result, VfsError};
use crate::source::ByteSource;

/// Owns one archive's decoded entry table and serves reads scoped to it.
///
/// The contents index is built exactly once, in [`ArchiveReader::load`], and
/// never changes afterwards.
pub struct ArchiveReader {
    id: Uuid,
    location: Url,
    /// Bytes entry content is extracted from
    data: Bytes,
    codec: Arc<dyn ArchiveCodec>,
    contents: ContentsIndex,
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("id", &self.id)
            .field("location", &self.location.as_str())
            .field("entries", &self.contents.len())
            .finish()
    }
}

impl ArchiveReader {
    /// Read, decode and index the archive at `location`.
    ///
    /// Errors from the byte source and the codec are returned unchanged.
    pub async fn load(
        id: Uuid,
        location: Url,
        source: &dyn ByteSource,
        codec: Arc<dyn ArchiveCodec>,
    ) -> anyhow::Result<Self> {
        let raw = source.read(&location).await?;
        let decoded = codec.decode(&location, raw).await?;

        let entries = decoded
            .entries
            .into_iter()
            .map(|raw| extend_entry(&id, raw))
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to build virtual URL for archive entry")?;
        let entries = synthesize_missing_directories(&id, entries)
            .context("Failed to build virtual URL for archive directory")?;
        let contents = ContentsIndex::build(entries);

        debug!(%id, %location, entries = contents.len(), "Indexed archive");

        Ok(ArchiveReader {
            id,
            location,
            data: decoded.data,
            codec,
            contents,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Number of indexed entries, synthesized directories included
    pub fn entry_count(&self) -> usize {
        self.contents.len()
    }

    /// Direct children of the directory at `path`, in index order
    pub fn list_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        let target = ArchivePath::parse(path);
        self.contents
            .children(&target.index_key())
            .map(|children| children.iter().map(|e| e.to_directory_entry()).collect())
            .ok_or_else(|| VfsError::not_found(target.to_string()))
    }

    /// Decompressed content of the file at `path`
    pub async fn read_binary(&self, path: &str) -> Result<Bytes> {
        let display_path = ArchivePath::parse(path).to_string();
        let (parent_path, name) = split_path(&display_path);

        let entry = self
            .contents
            .find(&parent_path, &name)
            .ok_or_else(|| VfsError::not_found(&display_path))?;

        let raw = match &entry.source {
            EntrySource::Synthesized => {
                return Err(VfsError::InternalConsistency {
                    path: display_path,
                    reason: "synthesized directory has no content",
                });
            }
            EntrySource::Declared(raw) if entry.is_dir() => {
                debug!(path = %display_path, stored = %raw.path, "Refusing to read directory");
                return Err(VfsError::InternalConsistency {
                    path: display_path,
                    reason: "directory has no content",
                });
            }
            EntrySource::Declared(raw) => raw,
        };

        self.codec
            .extract(&self.data, raw)
            .await
            .map_err(VfsError::Load)
    }

    /// Content of the file at `path`, decoded as UTF-8
    pub async fn read_text(&self, path: &str) -> Result<String> {
        let bytes = self.read_binary(path).await?;
        String::from_utf8(bytes.to_vec()).map_err(|source| VfsError::InvalidUtf8 {
            path: ArchivePath::parse(path).to_string(),
            source,
        })
    }
}
