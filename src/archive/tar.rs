use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::Read;
use tracing::debug;
use url::Url;

use super::{ArchiveCodec, ArchiveFormat, DecodedArchive, EntryLocation, RawEntry};

/// Codec for plain, gzip and bzip2 compressed tarballs.
///
/// Compressed tarballs are inflated once at decode time; entry content is
/// then sliced straight out of the decompressed stream.
#[derive(Debug, Clone, Copy)]
pub struct TarCodec {
    format: ArchiveFormat,
}

impl TarCodec {
    pub fn new(format: ArchiveFormat) -> Self {
        TarCodec { format }
    }

    fn decompress(format: ArchiveFormat, raw: Bytes) -> Result<Bytes> {
        let mut out = Vec::new();
        match format {
            ArchiveFormat::Tar => return Ok(raw),
            ArchiveFormat::TarGz => {
                flate2::read::GzDecoder::new(&raw[..])
                    .read_to_end(&mut out)
                    .context("Failed to decompress gzip stream")?;
            }
            ArchiveFormat::TarBz2 => {
                bzip2::read::BzDecoder::new(&raw[..])
                    .read_to_end(&mut out)
                    .context("Failed to decompress bzip2 stream")?;
            }
            ArchiveFormat::Zip => {
                return Err(anyhow!("Unsupported tar archive type: {format:?}"));
            }
        }
        Ok(Bytes::from(out))
    }
}

#[async_trait]
impl ArchiveCodec for TarCodec {
    async fn decode(&self, location: &Url, raw: Bytes) -> Result<DecodedArchive> {
        let format = self.format;
        let archive = tokio::task::spawn_blocking(move || -> Result<DecodedArchive> {
            let data = Self::decompress(format, raw)?;
            let entries = list_tar(&data)?;
            Ok(DecodedArchive { entries, data })
        })
        .await
        .context("Failed to join blocking task")?
        .with_context(|| format!("Failed to read tar file at \"{location}\""))?;

        debug!(%location, entries = archive.entries.len(), "Decoded tar headers");
        Ok(archive)
    }

    async fn extract(&self, data: &Bytes, entry: &RawEntry) -> Result<Bytes> {
        let EntryLocation::Tar { data_offset } = entry.location else {
            return Err(anyhow!("Invalid entry type for tar extraction: {}", entry.path));
        };

        if entry.is_dir {
            return Err(anyhow!("Cannot extract directory: {}", entry.path));
        }

        let end = data_offset
            .checked_add(entry.size)
            .filter(|end| *end <= data.len() as u64)
            .ok_or_else(|| {
                anyhow!(
                    "Tar entry {} extends beyond archive bounds (offset {} + size {} > {})",
                    entry.path,
                    data_offset,
                    entry.size,
                    data.len()
                )
            })?;

        Ok(data.slice(data_offset as usize..end as usize))
    }
}

/// Walk the members of a fully buffered tar stream.
///
/// Regular files and directories are reported with their data offset in
/// `data`; links, devices and other special members are skipped. GNU long
/// names, pax `path` records and ustar prefixes are resolved by `tar`.
fn list_tar(data: &[u8]) -> Result<Vec<RawEntry>> {
    let mut archive = tar::Archive::new(data);
    let mut entries = Vec::new();

    for entry_result in archive.entries().context("Failed to read tar headers")? {
        let entry = entry_result.context("Failed to read tar entry")?;

        let path = entry
            .path()
            .context("Failed to get entry path")?
            .to_string_lossy()
            .to_string();

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() || path.ends_with('/') {
            entries.push(RawEntry::tar_entry(path, entry.raw_file_position(), 0, true));
        } else if entry_type.is_file() || entry_type.is_contiguous() {
            entries.push(RawEntry::tar_entry(
                path,
                entry.raw_file_position(),
                entry.size(),
                false,
            ));
        } else {
            debug!(path = %path, typeflag = %(entry_type.as_byte() as char), "Skipping special tar member");
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = ::tar::Builder::new(Vec::new());
        for (path, content) in files {
            let mut header = ::tar::Header::new_gnu();
            if path.ends_with('/') {
                header.set_entry_type(::tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                builder.append_data(&mut header, path, std::io::empty()).unwrap();
            } else {
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                builder.append_data(&mut header, path, *content).unwrap();
            }
        }
        builder.into_inner().unwrap()
    }

    fn location() -> Url {
        Url::parse("file:///tmp/test.tar").unwrap()
    }

    impl RawEntry {
        fn data_offset(&self) -> usize {
            match self.location {
                EntryLocation::Tar { data_offset } => data_offset as usize,
                EntryLocation::Zip { .. } => panic!("not a tar entry"),
            }
        }
    }

    #[test]
    fn test_list_tar_empty() {
        let entries = list_tar(&[0u8; 1024]).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_list_tar_entries_in_order() {
        let data = build_tar(&[("app/", b""), ("app/main.rs", b"fn main() {}"), ("README", b"hi")]);
        let entries = list_tar(&data).unwrap();

        let paths: Vec<_> = entries
            .iter()
            .map(|e| e.path.trim_end_matches('/'))
            .collect();
        assert_eq!(paths, ["app", "app/main.rs", "README"]);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].size, 12);
    }

    #[test]
    fn test_list_tar_long_gnu_name() {
        let long = format!("{}/file.txt", "d".repeat(120));
        let data = build_tar(&[(long.as_str(), b"x")]);
        let entries = list_tar(&data).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, long);
    }

    #[test]
    fn test_list_tar_ustar_prefix() {
        let long = format!("{}/file.txt", "p".repeat(120));
        let mut builder = ::tar::Builder::new(Vec::new());
        let mut header = ::tar::Header::new_ustar();
        header.set_size(2);
        header.set_mode(0o644);
        builder.append_data(&mut header, &long, &b"ok"[..]).unwrap();
        let data = builder.into_inner().unwrap();

        let entries = list_tar(&data).unwrap();
        assert_eq!(entries[0].path, long);
        let offset = entries[0].data_offset();
        assert_eq!(&data[offset..offset + 2], b"ok");
    }

    #[test]
    fn test_list_tar_pax_path() {
        let long = format!("pax/{}.txt", "q".repeat(150));
        let body = format!(" path={long}\n");
        let mut len = body.len();
        while len.to_string().len() + body.len() != len {
            len = len.to_string().len() + body.len();
        }
        let record = format!("{len}{body}");

        let mut builder = ::tar::Builder::new(Vec::new());
        let mut pax = ::tar::Header::new_ustar();
        pax.set_entry_type(::tar::EntryType::XHeader);
        pax.set_size(record.len() as u64);
        pax.set_mode(0o644);
        builder
            .append_data(&mut pax, "PaxHeaders/short.txt", record.as_bytes())
            .unwrap();
        let mut header = ::tar::Header::new_ustar();
        header.set_size(5);
        header.set_mode(0o644);
        builder.append_data(&mut header, "short.txt", &b"hello"[..]).unwrap();
        let data = builder.into_inner().unwrap();

        let entries = list_tar(&data).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, long);
        let offset = entries[0].data_offset();
        assert_eq!(&data[offset..offset + 5], b"hello");
    }

    #[test]
    fn test_list_tar_skips_symlinks() {
        let mut builder = ::tar::Builder::new(Vec::new());
        let mut link = ::tar::Header::new_gnu();
        link.set_entry_type(::tar::EntryType::Symlink);
        link.set_size(0);
        link.set_mode(0o777);
        builder.append_link(&mut link, "latest", "a.txt").unwrap();
        let mut header = ::tar::Header::new_gnu();
        header.set_size(1);
        header.set_mode(0o644);
        builder.append_data(&mut header, "a.txt", &b"a"[..]).unwrap();
        let data = builder.into_inner().unwrap();

        let entries = list_tar(&data).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["a.txt"]);
    }

    #[tokio::test]
    async fn test_decode_and_extract_tar_gz() {
        use flate2::write::GzEncoder;
        use std::io::Write;

        let tar = build_tar(&[("a/b.txt", b"nested content"), ("c.txt", b"top")]);
        let mut gz = GzEncoder::new(Vec::new(), flate2::Compression::default());
        gz.write_all(&tar).unwrap();
        let raw = Bytes::from(gz.finish().unwrap());

        let codec = TarCodec::new(ArchiveFormat::TarGz);
        let archive = codec.decode(&location(), raw).await.unwrap();
        assert_eq!(archive.entries.len(), 2);

        let bytes = codec.extract(&archive.data, &archive.entries[0]).await.unwrap();
        assert_eq!(&bytes[..], b"nested content");
        let bytes = codec.extract(&archive.data, &archive.entries[1]).await.unwrap();
        assert_eq!(&bytes[..], b"top");
    }

    #[tokio::test]
    async fn test_extract_rejects_directory() {
        let data = Bytes::from(build_tar(&[("dir/", b"")]));
        let codec = TarCodec::new(ArchiveFormat::Tar);
        let archive = codec.decode(&location(), data).await.unwrap();
        let err = codec.extract(&archive.data, &archive.entries[0]).await.unwrap_err();
        assert!(err.to_string().contains("Cannot extract directory"));
    }
}
