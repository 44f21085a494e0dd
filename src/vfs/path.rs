/// Split an in-archive path on its last separator into `(parent_path, name)`.
///
/// Top-level names get the root parent `""`; nested names get a parent that
/// always starts with a single `/` (`"a/b/c.txt"` -> `("/a/b", "c.txt")`).
pub fn split_path(path: &str) -> (String, String) {
    let path = path.trim_start_matches('/');
    match path.rfind('/') {
        None => (String::new(), path.to_string()),
        Some(pos) => (format!("/{}", &path[..pos]), path[pos + 1..].to_string()),
    }
}

/// A normalized, absolute path inside one archive
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ArchivePath {
    /// Path segments (e.g., ["subdirectory", "nested.json"])
    segments: Vec<String>,
}

impl ArchivePath {
    /// The archive root
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path, resolving `.` and `..`; leading and trailing slashes are ignored
    pub fn parse(path: &str) -> Self {
        Self::root().join(path)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(ArchivePath { segments })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    /// Resolve `other` against this path. Absolute inputs restart from the root,
    /// and `..` never climbs above it.
    pub fn join(&self, other: &str) -> Self {
        let mut segments = if other.starts_with('/') {
            Vec::new()
        } else {
            self.segments.clone()
        };

        for segment in other.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s.to_string()),
            }
        }

        ArchivePath { segments }
    }

    /// Key of this directory in a contents index (root is `""`)
    pub fn index_key(&self) -> String {
        if self.is_root() {
            String::new()
        } else {
            format!("/{}", self.segments.join("/"))
        }
    }
}

impl std::fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_top_level() {
        assert_eq!(split_path("test.txt"), (String::new(), "test.txt".to_string()));
    }

    #[test]
    fn test_split_nested() {
        assert_eq!(
            split_path("subdirectory/nested.json"),
            ("/subdirectory".to_string(), "nested.json".to_string())
        );
        assert_eq!(split_path("a/b/c"), ("/a/b".to_string(), "c".to_string()));
    }

    #[test]
    fn test_split_never_doubles_leading_slash() {
        assert_eq!(split_path("/a/b"), ("/a".to_string(), "b".to_string()));
        assert_eq!(split_path("/top"), (String::new(), "top".to_string()));
    }

    #[test]
    fn test_parse_and_display() {
        let path = ArchivePath::parse("/subdirectory/nested.json/");
        assert_eq!(path.segments(), &["subdirectory", "nested.json"]);
        assert_eq!(path.to_string(), "/subdirectory/nested.json");
        assert_eq!(ArchivePath::root().to_string(), "/");
    }

    #[test]
    fn test_index_key() {
        assert_eq!(ArchivePath::parse("/").index_key(), "");
        assert_eq!(ArchivePath::parse("").index_key(), "");
        assert_eq!(ArchivePath::parse("subdirectory").index_key(), "/subdirectory");
    }

    #[test]
    fn test_join_relative_and_absolute() {
        let path = ArchivePath::parse("/a/b");
        assert_eq!(path.join("c/d.txt").to_string(), "/a/b/c/d.txt");
        assert_eq!(path.join("../e").to_string(), "/a/e");
        assert_eq!(path.join("/x").to_string(), "/x");
        assert_eq!(path.join("../../../..").to_string(), "/");
    }

    #[test]
    fn test_parent_and_file_name() {
        let path = ArchivePath::parse("a/b.txt");
        assert_eq!(path.file_name(), Some("b.txt"));
        assert_eq!(path.parent().unwrap().to_string(), "/a");
        assert!(ArchivePath::root().parent().is_none());
    }
}
