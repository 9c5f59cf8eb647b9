//! Core VFS types: stored entries and metadata.

use serde::{Deserialize, Serialize};

/// Kind of a stored entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// A stored filesystem node, keyed by its normalized absolute path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Normalized absolute path (primary key)
    pub path: String,
    /// File or directory
    pub kind: EntryKind,
    /// File content (empty for directories)
    #[serde(default)]
    pub content: Vec<u8>,
    /// Last modification time (milliseconds since epoch)
    pub modified_at: u64,
}

impl Entry {
    /// Create a directory entry.
    pub fn new_directory(path: impl Into<String>, modified_at: u64) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            content: Vec::new(),
            modified_at,
        }
    }

    /// Create a file entry.
    pub fn new_file(path: impl Into<String>, content: Vec<u8>, modified_at: u64) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            content,
            modified_at,
        }
    }

    /// Check if this is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Content size in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Metadata returned by `stat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// File or directory
    pub kind: EntryKind,
    /// Content size in bytes (0 for directories)
    pub size: u64,
    /// Last modification time
    pub modified_at: u64,
    /// File content (`None` for directories)
    pub content: Option<Vec<u8>>,
}

impl Stat {
    /// Check if this is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

impl From<Entry> for Stat {
    fn from(entry: Entry) -> Self {
        let size = entry.size();
        let content = match entry.kind {
            EntryKind::File => Some(entry.content),
            EntryKind::Directory => None,
        };
        Self {
            kind: entry.kind,
            size,
            modified_at: entry.modified_at,
            content,
        }
    }
}
