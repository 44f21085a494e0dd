pub mod tar;
pub mod zip;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

pub use self::tar::TarCodec;
pub use self::zip::ZipCodec;

/// Container formats the built-in codecs understand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
    TarBz2,
}

impl ArchiveFormat {
    /// Detect archive format from file extension
    pub fn from_path(path: &str) -> Option<Self> {
        let path_lower = path.to_lowercase();
        if path_lower.ends_with(".tar.gz") || path_lower.ends_with(".tgz") {
            return Some(ArchiveFormat::TarGz);
        }
        if path_lower.ends_with(".tar.bz2") || path_lower.ends_with(".tbz2") {
            return Some(ArchiveFormat::TarBz2);
        }
        if path_lower.ends_with(".tar") {
            return Some(ArchiveFormat::Tar);
        }
        if path_lower.ends_with(".zip") || path_lower.ends_with(".jar") {
            return Some(ArchiveFormat::Zip);
        }
        None
    }

    /// Detect archive format from leading magic bytes
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06") {
            return Some(ArchiveFormat::Zip);
        }
        if data.starts_with(&[0x1f, 0x8b]) {
            return Some(ArchiveFormat::TarGz);
        }
        if data.starts_with(b"BZh") {
            return Some(ArchiveFormat::TarBz2);
        }
        if data.len() >= 262 && &data[257..262] == b"ustar" {
            return Some(ArchiveFormat::Tar);
        }
        None
    }
}

/// Where an entry's content lives inside [`DecodedArchive::data`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryLocation {
    Zip {
        local_header_offset: u64,
        compressed_size: u64,
        compression_method: u16,
        crc32: u32,
    },
    Tar {
        data_offset: u64,
    },
}

/// One record of an archive's entry table, as reported by a codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Path exactly as stored in the archive (directories usually end with `/`)
    pub path: String,
    /// Uncompressed size
    pub size: u64,
    pub is_dir: bool,
    pub location: EntryLocation,
}

impl RawEntry {
    pub fn zip_entry(
        path: String,
        size: u64,
        is_dir: bool,
        local_header_offset: u64,
        compressed_size: u64,
        compression_method: u16,
        crc32: u32,
    ) -> Self {
        Self {
            path,
            size,
            is_dir,
            location: EntryLocation::Zip {
                local_header_offset,
                compressed_size,
                compression_method,
                crc32,
            },
        }
    }

    pub fn tar_entry(path: String, data_offset: u64, size: u64, is_dir: bool) -> Self {
        Self {
            path,
            size,
            is_dir,
            location: EntryLocation::Tar { data_offset },
        }
    }
}

/// Decoded entry table plus the bytes entry content is extracted from.
///
/// For zip archives `data` is the archive itself; for compressed tarballs it
/// is the decompressed tar stream.
#[derive(Debug, Clone)]
pub struct DecodedArchive {
    pub entries: Vec<RawEntry>,
    pub data: Bytes,
}

/// Decodes an archive's entry table and extracts entry content
#[async_trait]
pub trait ArchiveCodec: Send + Sync {
    /// Build the entry table from the raw archive bytes read from `location`
    async fn decode(&self, location: &Url, raw: Bytes) -> Result<DecodedArchive>;

    /// Extract the decompressed content of a single entry
    async fn extract(&self, data: &Bytes, entry: &RawEntry) -> Result<Bytes>;
}

/// Default codec: picks zip or tar handling by extension, falling back to magic bytes
#[derive(Debug, Default, Clone, Copy)]
pub struct FormatCodec;

impl FormatCodec {
    pub fn new() -> Self {
        FormatCodec
    }
}

#[async_trait]
impl ArchiveCodec for FormatCodec {
    async fn decode(&self, location: &Url, raw: Bytes) -> Result<DecodedArchive> {
        let format = ArchiveFormat::from_path(location.path())
            .or_else(|| ArchiveFormat::sniff(&raw))
            .ok_or_else(|| anyhow!("Unrecognized archive format at \"{location}\""))?;

        match format {
            ArchiveFormat::Zip => ZipCodec::new().decode(location, raw).await,
            ArchiveFormat::Tar | ArchiveFormat::TarGz | ArchiveFormat::TarBz2 => {
                TarCodec::new(format).decode(location, raw).await
            }
        }
    }

    async fn extract(&self, data: &Bytes, entry: &RawEntry) -> Result<Bytes> {
        match entry.location {
            EntryLocation::Zip { .. } => ZipCodec::new().extract(data, entry).await,
            EntryLocation::Tar { .. } => TarCodec::new(ArchiveFormat::Tar).extract(data, entry).await,
        }
    }
}
