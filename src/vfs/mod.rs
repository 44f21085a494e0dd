pub mod node;
pub mod path;
pub mod reader;

pub use node::{
    ContentsIndex, DirectoryEntry, EntryKind, EntrySource, ExtendedEntry, extend_entry,
    synthesize_missing_directories,
};
pub use path::{ArchivePath, split_path};
pub use reader::ArchiveReader;

use url::Url;
use uuid::Uuid;

/// URL scheme reserved for addresses inside cached archives
pub const VIRTUAL_SCHEME: &str = "zipvfs";

/// Build `zipvfs://<archive id>/<full path>`, percent-encoding each segment.
///
/// `.` and `..` segments are collapsed by URL parsing even when encoded as
/// `%2E`, so indexed entries never carry them.
pub fn virtual_url(archive_id: &Uuid, full_path: &str) -> Result<Url, url::ParseError> {
    let encoded: Vec<String> = full_path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    Url::parse(&format!(
        "{VIRTUAL_SCHEME}://{archive_id}/{}",
        encoded.join("/")
    ))
}

pub fn is_virtual(url: &Url) -> bool {
    url.scheme() == VIRTUAL_SCHEME
}

/// Archive identifier carried in a virtual URL's authority
pub fn archive_id(url: &Url) -> Option<Uuid> {
    if !is_virtual(url) {
        return None;
    }
    Uuid::parse_str(url.host_str()?).ok()
}

/// Decoded in-archive path of a virtual URL (`/a/b c.txt`)
pub fn in_archive_path(url: &Url) -> Option<String> {
    let decoded: Result<Vec<_>, _> = url
        .path()
        .split('/')
        .map(urlencoding::decode)
        .collect();
    decoded.ok().map(|segments| {
        let joined = segments.join("/");
        if joined.starts_with('/') {
            joined
        } else {
            format!("/{joined}")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_url_round_trip() {
        let id = Uuid::new_v4();
        let url = virtual_url(&id, "dir with space/file?.txt").unwrap();

        assert!(is_virtual(&url));
        assert_eq!(archive_id(&url), Some(id));
        assert_eq!(in_archive_path(&url).unwrap(), "/dir with space/file?.txt");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_root_url() {
        let id = Uuid::new_v4();
        let url = virtual_url(&id, "").unwrap();
        assert_eq!(url.as_str(), format!("zipvfs://{id}/"));
        assert_eq!(in_archive_path(&url).unwrap(), "/");
    }

    #[test]
    fn test_virtual_url_collapses_dot_segments() {
        let id = Uuid::new_v4();
        let url = virtual_url(&id, "a/../b.txt").unwrap();
        assert_eq!(in_archive_path(&url).unwrap(), "/b.txt");
    }

    #[test]
    fn test_archive_id_rejects_other_urls() {
        let file = Url::parse("file:///tmp/a.zip").unwrap();
        assert_eq!(archive_id(&file), None);

        let bogus = Url::parse("zipvfs://not-a-uuid/a").unwrap();
        assert_eq!(archive_id(&bogus), None);
    }
}
