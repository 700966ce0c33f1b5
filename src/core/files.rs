//! Virtual file store - Path-addressed file and directory entries of an instance
//!
//! Entries form a flat list. Each entry records the normalized path of its
//! parent directory; containment is purely a matter of path-string equality,
//! so there are no parent/child references to keep in sync.

use chrono::Local;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{EngineError, EngineResult};

/// Placeholder content written for uploaded files
pub const UPLOAD_PLACEHOLDER: &str = "// uploaded file";

/// Suffix recognized by the unzip pipeline
pub const ARCHIVE_SUFFIX: &str = ".zip";

/// Identifier of a file entry, unique within one instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string()[..12].to_string())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Size of an entry: a byte count for files, a sentinel for directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSize {
    Bytes(u64),
    Directory,
}

impl FileSize {
    pub fn of(content: &str) -> Self {
        Self::Bytes(content.len() as u64)
    }
}

impl std::fmt::Display for FileSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Directory => write!(f, "--"),
            Self::Bytes(b) if *b < 1024 => write!(f, "{} B", b),
            Self::Bytes(b) if *b < 1024 * 1024 => write!(f, "{:.1} KB", *b as f64 / 1024.0),
            Self::Bytes(b) => write!(f, "{:.1} MB", *b as f64 / (1024.0 * 1024.0)),
        }
    }
}

/// One file or directory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    pub id: FileId,
    pub name: String,
    pub is_directory: bool,
    /// Normalized absolute path of the parent directory
    pub path: String,
    pub size: FileSize,
    /// Human-readable modification label
    pub modified: String,
    /// Always `None` for directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileItem {
    pub fn file(path: &str, name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: FileId::new(),
            name: name.into(),
            is_directory: false,
            path: normalize_path(path),
            size: FileSize::of(&content),
            modified: modified_label(),
            content: Some(content),
        }
    }

    pub fn directory(path: &str, name: impl Into<String>) -> Self {
        Self {
            id: FileId::new(),
            name: name.into(),
            is_directory: true,
            path: normalize_path(path),
            size: FileSize::Directory,
            modified: modified_label(),
            content: None,
        }
    }

    /// Full path of this entry (its parent path joined with its name)
    pub fn full_path(&self) -> String {
        join_path(&self.path, &self.name)
    }

    /// Name of the directory an archive extracts into, if this is an archive
    pub fn archive_stem(&self) -> Option<&str> {
        if self.is_directory || self.name.len() <= ARCHIVE_SUFFIX.len() {
            return None;
        }
        let split = self.name.len() - ARCHIVE_SUFFIX.len();
        if !self.name.is_char_boundary(split) {
            return None;
        }
        let (stem, suffix) = self.name.split_at(split);
        suffix.eq_ignore_ascii_case(ARCHIVE_SUFFIX).then_some(stem)
    }
}

/// Normalize a directory path: leading `/`, no trailing `/`, no empty segments
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Join a parent directory path and an entry name
pub fn join_path(parent: &str, name: &str) -> String {
    let parent = normalize_path(parent);
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

fn modified_label() -> String {
    Local::now().format("%Y-%m-%d %H:%M").to_string()
}

/// Flat, path-addressed store of one instance's files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileStore {
    entries: Vec<FileItem>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<FileItem>) -> Self {
        Self { entries }
    }

    /// All entries in store order
    pub fn entries(&self) -> &[FileItem] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &FileId) -> Option<&FileItem> {
        self.entries.iter().find(|f| &f.id == id)
    }

    /// Entries whose parent path equals `path` (non-recursive)
    pub fn list(&self, path: &str) -> Vec<FileItem> {
        let path = normalize_path(path);
        self.entries
            .iter()
            .filter(|f| f.path == path)
            .cloned()
            .collect()
    }

    /// Insert a new entry. Duplicate `(path, name)` pairs are allowed.
    pub fn create(
        &mut self,
        path: &str,
        name: &str,
        is_directory: bool,
        content: Option<String>,
    ) -> EngineResult<FileId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::EmptyName);
        }

        let item = if is_directory {
            FileItem::directory(path, name)
        } else {
            FileItem::file(path, name, content.unwrap_or_default())
        };
        Ok(self.insert(item))
    }

    /// Insert an uploaded file whose size is the uploaded byte count
    pub fn upload(&mut self, path: &str, name: &str, bytes: u64) -> EngineResult<FileId> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::EmptyName);
        }

        let mut item = FileItem::file(path, name, UPLOAD_PLACEHOLDER);
        item.size = FileSize::Bytes(bytes);
        Ok(self.insert(item))
    }

    /// Add a prepared entry, re-rolling its id on collision
    pub fn insert(&mut self, mut item: FileItem) -> FileId {
        while self.get(&item.id).is_some() {
            item.id = FileId::new();
        }
        let id = item.id.clone();
        self.entries.push(item);
        id
    }

    /// Replace a file's content. Returns `false` (no-op) for unknown ids and directories.
    pub fn update(&mut self, id: &FileId, content: &str) -> bool {
        match self.entries.iter_mut().find(|f| &f.id == id) {
            Some(item) if !item.is_directory => {
                item.size = FileSize::of(content);
                item.content = Some(content.to_string());
                item.modified = modified_label();
                true
            }
            _ => false,
        }
    }

    /// Remove exactly one entry. Entries under a removed directory are left in place.
    pub fn delete(&mut self, id: &FileId) -> Option<FileItem> {
        let pos = self.entries.iter().position(|f| &f.id == id)?;
        Some(self.entries.remove(pos))
    }

    /// Remove an entry and, for directories, every entry below its full path
    pub fn delete_tree(&mut self, id: &FileId) -> Vec<FileItem> {
        let Some(root) = self.get(id).cloned() else {
            return Vec::new();
        };

        let prefix = root.full_path();
        let nested = format!("{}/", prefix);
        let (removed, kept): (Vec<FileItem>, Vec<FileItem>) =
            std::mem::take(&mut self.entries).into_iter().partition(|f| {
                &f.id == id
                    || (root.is_directory && (f.path == prefix || f.path.starts_with(&nested)))
            });
        self.entries = kept;
        removed
    }

    /// Entries whose parent directory no longer exists in the store
    pub fn orphans(&self) -> Vec<&FileItem> {
        self.entries
            .iter()
            .filter(|f| f.path != "/")
            .filter(|f| {
                !self
                    .entries
                    .iter()
                    .any(|d| d.is_directory && d.full_path() == f.path)
            })
            .collect()
    }

    /// Files that carry content, in store order
    pub fn sources(&self) -> impl Iterator<Item = &FileItem> {
        self.entries
            .iter()
            .filter(|f| !f.is_directory && f.content.is_some())
    }
}
