use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use flate2::read::DeflateDecoder;
use std::io::Read;
use tracing::debug;
use url::Url;

use super::{ArchiveCodec, DecodedArchive, EntryLocation, RawEntry};

/// Maximum size to search for the End of Central Directory (64KB comment + record)
const EOCD_SEARCH_SIZE: usize = 65536 + MIN_EOCD_SIZE;

/// Minimum size for EOCD (4 bytes signature + 18 bytes data)
const MIN_EOCD_SIZE: usize = 22;

/// Central Directory File Header minimum size (fixed portion)
const CDFH_MIN_SIZE: usize = 46;

/// Local File Header minimum size (fixed portion)
const LOCAL_HEADER_MIN_SIZE: usize = 30;

/// ZIP compression methods
const COMPRESSION_STORED: u16 = 0;
const COMPRESSION_DEFLATE: u16 = 8;

/// Maximum allowed decompressed size (1GB) to prevent zip bombs
const MAX_DECOMPRESSED_SIZE: u64 = 1024 * 1024 * 1024;

/// Codec for ZIP archives held fully in memory
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipCodec;

/// Location of the central directory, taken from the EOCD record
#[derive(Debug)]
struct EocdInfo {
    central_dir_offset: u64,
    central_dir_size: u64,
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// Upper half of code page 437, the encoding for names without the UTF-8 flag
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

fn decode_cp437(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b < 0x80 { b as char } else { CP437_HIGH[(b - 0x80) as usize] })
        .collect()
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

#[async_trait]
impl ArchiveCodec for ZipCodec {
    async fn decode(&self, location: &Url, raw: Bytes) -> Result<DecodedArchive> {
        let entries = tokio::task::spawn_blocking({
            let raw = raw.clone();
            move || Self::read_entries(&raw)
        })
        .await
        .context("Failed to join blocking task")?
        .with_context(|| format!("Failed to read zip file at \"{location}\""))?;

        debug!(%location, entries = entries.len(), "Decoded zip central directory");
        Ok(DecodedArchive { entries, data: raw })
    }

    async fn extract(&self, data: &Bytes, entry: &RawEntry) -> Result<Bytes> {
        let data = data.clone();
        let entry = entry.clone();
        tokio::task::spawn_blocking(move || Self::extract_entry(&data, &entry))
            .await
            .context("Failed to join blocking task")?
    }
}

impl ZipCodec {
    pub fn new() -> Self {
        ZipCodec
    }

    /// Locate and parse the central directory of a complete archive
    fn read_entries(data: &[u8]) -> Result<Vec<RawEntry>> {
        if data.len() < MIN_EOCD_SIZE {
            return Err(anyhow!("File too small to be a valid ZIP archive"));
        }

        let tail_start = data.len().saturating_sub(EOCD_SEARCH_SIZE);
        let eocd = Self::find_eocd(&data[tail_start..])?;

        let cd_end = eocd
            .central_dir_offset
            .checked_add(eocd.central_dir_size)
            .ok_or_else(|| anyhow!("Central directory bounds overflow"))?;

        if cd_end > data.len() as u64 {
            return Err(anyhow!(
                "Central directory extends beyond file bounds (offset {} + size {} > file size {})",
                eocd.central_dir_offset,
                eocd.central_dir_size,
                data.len()
            ));
        }

        let central_dir = &data[eocd.central_dir_offset as usize..cd_end as usize];
        Self::parse_central_directory(central_dir, data.len() as u64)
    }

    /// Find the End of Central Directory record, searching backwards from the end
    fn find_eocd(data: &[u8]) -> Result<EocdInfo> {
        const EOCD_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];

        if data.len() < MIN_EOCD_SIZE {
            return Err(anyhow!("Could not find End of Central Directory record"));
        }

        for i in (0..=data.len() - MIN_EOCD_SIZE).rev() {
            if !data[i..].starts_with(&EOCD_SIGNATURE) {
                continue;
            }
            let eocd = &data[i..];

            let disk_number = read_u16(eocd, 4);
            let disk_with_cd = read_u16(eocd, 6);
            if disk_number != 0 || disk_with_cd != 0 {
                return Err(anyhow!(
                    "Multi-disk ZIP archives are not supported (disk {}, CD disk {})",
                    disk_number,
                    disk_with_cd
                ));
            }

            let central_dir_size = read_u32(eocd, 12);
            let central_dir_offset = read_u32(eocd, 16);

            // ZIP64 uses 0xFFFFFFFF as a placeholder
            if central_dir_size == u32::MAX || central_dir_offset == u32::MAX {
                return Err(anyhow!(
                    "ZIP64 archives are not supported (central directory fields use ZIP64 placeholder values)"
                ));
            }

            return Ok(EocdInfo {
                central_dir_offset: central_dir_offset as u64,
                central_dir_size: central_dir_size as u64,
            });
        }

        Err(anyhow!("Could not find End of Central Directory record"))
    }

    /// Parse central directory file headers into entries, in archive order.
    ///
    /// Sizes and CRCs come from the central directory, so entries written with
    /// a trailing data descriptor (flag bit 3) are read like any other. Names
    /// without the UTF-8 flag (bit 11) are decoded as code page 437.
    fn parse_central_directory(data: &[u8], archive_size: u64) -> Result<Vec<RawEntry>> {
        const CDFH_SIGNATURE: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];

        let mut entries = Vec::new();
        let mut pos = 0;

        while pos + CDFH_MIN_SIZE <= data.len() {
            if !data[pos..].starts_with(&CDFH_SIGNATURE) {
                break;
            }

            let general_purpose_flag = read_u16(data, pos + 8);
            if general_purpose_flag & 0x0001 != 0 {
                return Err(anyhow!("Encrypted ZIP entries are not supported"));
            }

            let compression_method = read_u16(data, pos + 10);
            let crc32 = read_u32(data, pos + 16);
            let compressed_size_raw = read_u32(data, pos + 20);
            let uncompressed_size_raw = read_u32(data, pos + 24);
            let local_header_offset_raw = read_u32(data, pos + 42);

            if compressed_size_raw == u32::MAX
                || uncompressed_size_raw == u32::MAX
                || local_header_offset_raw == u32::MAX
            {
                return Err(anyhow!(
                    "ZIP64 entries are not supported (entry uses ZIP64 placeholder values)"
                ));
            }

            let local_header_offset = local_header_offset_raw as u64;
            if local_header_offset >= archive_size {
                return Err(anyhow!(
                    "Invalid local header offset {} for archive size {}",
                    local_header_offset,
                    archive_size
                ));
            }

            let filename_len = read_u16(data, pos + 28) as usize;
            let extra_len = read_u16(data, pos + 30) as usize;
            let comment_len = read_u16(data, pos + 32) as usize;

            let end = pos + CDFH_MIN_SIZE + filename_len + extra_len + comment_len;
            if end > data.len() {
                return Err(anyhow!(
                    "Truncated central directory entry at position {}",
                    pos
                ));
            }

            let filename_bytes = &data[pos + CDFH_MIN_SIZE..pos + CDFH_MIN_SIZE + filename_len];
            let filename = if general_purpose_flag & (1 << 11) != 0 {
                String::from_utf8_lossy(filename_bytes).into_owned()
            } else {
                decode_cp437(filename_bytes)
            };

            let is_dir = filename.ends_with('/');
            entries.push(RawEntry::zip_entry(
                filename,
                uncompressed_size_raw as u64,
                is_dir,
                local_header_offset,
                compressed_size_raw as u64,
                compression_method,
                crc32,
            ));

            pos = end;
        }

        Ok(entries)
    }

    /// Decompress one entry and verify its size and CRC-32
    fn extract_entry(data: &[u8], entry: &RawEntry) -> Result<Bytes> {
        let EntryLocation::Zip {
            local_header_offset,
            compressed_size,
            compression_method,
            crc32: expected_crc32,
        } = entry.location
        else {
            return Err(anyhow!("Invalid entry type for ZIP extraction: {}", entry.path));
        };

        if entry.is_dir {
            return Err(anyhow!("Cannot extract directory: {}", entry.path));
        }

        if entry.size > MAX_DECOMPRESSED_SIZE {
            return Err(anyhow!(
                "File too large to extract safely: {} bytes exceeds {} byte limit",
                entry.size,
                MAX_DECOMPRESSED_SIZE
            ));
        }

        let file_size = data.len() as u64;
        let header_end = local_header_offset + LOCAL_HEADER_MIN_SIZE as u64;
        if header_end > file_size {
            return Err(anyhow!(
                "Invalid local header offset {} for file size {}",
                local_header_offset,
                file_size
            ));
        }

        let local_header = &data[local_header_offset as usize..header_end as usize];
        if !local_header.starts_with(&[0x50, 0x4b, 0x03, 0x04]) {
            return Err(anyhow!("Invalid local file header signature"));
        }

        let filename_len = read_u16(local_header, 26) as u64;
        let extra_len = read_u16(local_header, 28) as u64;

        let data_offset = header_end
            .checked_add(filename_len)
            .and_then(|v| v.checked_add(extra_len))
            .ok_or_else(|| anyhow!("Data offset calculation overflow"))?;
        let data_end = data_offset
            .checked_add(compressed_size)
            .ok_or_else(|| anyhow!("Data end calculation overflow"))?;

        if data_end > file_size {
            return Err(anyhow!(
                "Compressed data extends beyond file bounds (offset {} + size {} > file size {})",
                data_offset,
                compressed_size,
                file_size
            ));
        }

        let compressed = &data[data_offset as usize..data_end as usize];

        let decompressed = match compression_method {
            COMPRESSION_STORED => {
                if compressed_size != entry.size {
                    return Err(anyhow!(
                        "Invalid ZIP entry: stored file has mismatched sizes (compressed={}, uncompressed={})",
                        compressed_size,
                        entry.size
                    ));
                }
                compressed.to_vec()
            }
            COMPRESSION_DEFLATE => {
                // One byte past the declared size is enough to detect overrun
                let mut decoder = DeflateDecoder::new(compressed);
                let mut out = Vec::with_capacity(entry.size as usize);
                (&mut decoder)
                    .take(entry.size + 1)
                    .read_to_end(&mut out)
                    .context("Failed to decompress deflate data")?;
                if out.len() as u64 > entry.size {
                    return Err(anyhow!(
                        "Deflate stream for {} inflates past its declared {} bytes",
                        entry.path,
                        entry.size
                    ));
                }
                out
            }
            other => {
                return Err(anyhow!(
                    "Unsupported compression method: {}. Only stored (0) and deflate (8) are supported.",
                    other
                ));
            }
        };

        if decompressed.len() as u64 != entry.size {
            return Err(anyhow!(
                "Decompressed size mismatch: expected {} bytes, got {} bytes",
                entry.size,
                decompressed.len()
            ));
        }

        let actual_crc32 = crc32(&decompressed);
        if actual_crc32 != expected_crc32 {
            return Err(anyhow!(
                "CRC-32 checksum mismatch: expected {:#010x}, got {:#010x}. File may be corrupted.",
                expected_crc32,
                actual_crc32
            ));
        }

        Ok(Bytes::from(decompressed))
    }
}
