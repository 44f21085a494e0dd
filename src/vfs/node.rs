use std::collections::{HashMap, HashSet};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::path::split_path;
use super::virtual_url;
use crate::archive::RawEntry;

/// Whether an entry is a file or a directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// Where an entry came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    /// Declared in the archive's entry table
    Declared(RawEntry),
    /// Directory inferred from the paths of its descendants
    Synthesized,
}

/// An archive entry with its position in the virtual tree worked out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedEntry {
    /// Parent directory key (`""` for the root, otherwise `/a/b`)
    pub parent_path: String,
    pub name: String,
    /// `zipvfs://<archive id>/<full path>`
    pub url: Url,
    pub kind: EntryKind,
    pub source: EntrySource,
}

impl ExtendedEntry {
    /// Full path without a leading slash (`a/b/c.txt`)
    pub fn full_path(&self) -> String {
        if self.parent_path.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.parent_path.trim_start_matches('/'), self.name)
        }
    }

    /// The backing archive record, absent for synthesized directories
    pub fn raw(&self) -> Option<&RawEntry> {
        match &self.source {
            EntrySource::Declared(raw) => Some(raw),
            EntrySource::Synthesized => None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn to_directory_entry(&self) -> DirectoryEntry {
        DirectoryEntry {
            name: self.name.clone(),
            kind: self.kind,
            url: self.url.clone(),
        }
    }
}

/// Public view of a directory listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: String,
    pub kind: EntryKind,
    pub url: Url,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Strip `./` and `/` prefixes and trailing separators from a stored path
fn normalize_entry_path(path: &str) -> &str {
    let mut path = path;
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.trim_start_matches('/').trim_end_matches('/')
}

/// Attach tree position, virtual URL and kind to a raw archive entry
pub fn extend_entry(archive_id: &Uuid, raw: RawEntry) -> Result<ExtendedEntry, url::ParseError> {
    let full_path = normalize_entry_path(&raw.path);
    let (parent_path, name) = split_path(full_path);
    let url = virtual_url(archive_id, full_path)?;
    let kind = if raw.is_dir {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    Ok(ExtendedEntry {
        parent_path,
        name,
        url,
        kind,
        source: EntrySource::Declared(raw),
    })
}

fn synthesized_directory(archive_id: &Uuid, full_path: &str) -> Result<ExtendedEntry, url::ParseError> {
    let (parent_path, name) = split_path(full_path);
    Ok(ExtendedEntry {
        parent_path,
        name,
        url: virtual_url(archive_id, full_path)?,
        kind: EntryKind::Directory,
        source: EntrySource::Synthesized,
    })
}

/// Insert directory entries for every ancestor the archive never declared.
///
/// Declaration order is kept; each synthesized directory lands right before
/// the first entry that implied it, outermost ancestor first. Entries that
/// repeat an earlier path, and entries naming the root itself, are dropped.
/// So are entries with `.`, `..` or empty segments: URL parsing collapses
/// them, so their virtual URLs could not lead back to the entry.
pub fn synthesize_missing_directories(
    archive_id: &Uuid,
    entries: Vec<ExtendedEntry>,
) -> Result<Vec<ExtendedEntry>, url::ParseError> {
    let declared: HashSet<String> = entries
        .iter()
        .filter(|e| e.is_dir())
        .map(|e| e.full_path())
        .collect();

    let mut synthesized: HashSet<String> = HashSet::new();
    let mut seen: HashSet<(String, EntryKind)> = HashSet::new();
    let mut result = Vec::with_capacity(entries.len());

    for entry in entries {
        if entry.name.is_empty() {
            continue;
        }
        if entry
            .full_path()
            .split('/')
            .any(|segment| matches!(segment, "" | "." | ".."))
        {
            debug!(path = %entry.full_path(), "Skipping archive entry with dot or empty segments");
            continue;
        }
        if !seen.insert((entry.full_path(), entry.kind)) {
            debug!(path = %entry.full_path(), "Skipping duplicate archive entry");
            continue;
        }

        let mut missing = Vec::new();
        let mut parent = entry.parent_path.clone();
        while !parent.is_empty() {
            let full = parent.trim_start_matches('/').to_string();
            if declared.contains(&full) || synthesized.contains(&full) {
                break;
            }
            parent = split_path(&full).0;
            missing.push(full);
        }

        for dir in missing.into_iter().rev() {
            result.push(synthesized_directory(archive_id, &dir)?);
            seen.insert((dir.clone(), EntryKind::Directory));
            synthesized.insert(dir);
        }

        result.push(entry);
    }

    Ok(result)
}

/// Directory key -> ordered direct children. Built once, read-only afterwards.
#[derive(Debug, Default)]
pub struct ContentsIndex {
    children: HashMap<String, Vec<ExtendedEntry>>,
    entry_count: usize,
}

impl ContentsIndex {
    /// Group entries by parent. The root and every directory get a key, so
    /// empty directories list as empty rather than missing.
    pub fn build(entries: Vec<ExtendedEntry>) -> Self {
        let mut children: HashMap<String, Vec<ExtendedEntry>> = HashMap::new();
        children.insert(String::new(), Vec::new());

        let entry_count = entries.len();
        for entry in entries {
            if entry.is_dir() {
                children
                    .entry(format!("/{}", entry.full_path()))
                    .or_default();
            }
            children
                .entry(entry.parent_path.clone())
                .or_default()
                .push(entry);
        }

        ContentsIndex {
            children,
            entry_count,
        }
    }

    /// Children of the directory with the given key
    pub fn children(&self, parent_path: &str) -> Option<&[ExtendedEntry]> {
        self.children.get(parent_path).map(|c| c.as_slice())
    }

    /// Find a direct child by name
    pub fn find(&self, parent_path: &str, name: &str) -> Option<&ExtendedEntry> {
        self.children(parent_path)?.iter().find(|e| e.name == name)
    }

    /// Number of entries, synthesized directories included
    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }
}
