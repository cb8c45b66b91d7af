//! Ordered directory listing for tree walks.

use std::path::{Path, PathBuf};

use crate::FileOpsError;

/// What a directory entry is, without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Full path.
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Lists the contents of a directory in byte-wise name order.
///
/// `.` and `..` are never returned. Symlinks are reported as such so the
/// caller can skip them.
pub fn list_directory(path: &Path) -> Result<Vec<DirEntry>, FileOpsError> {
    let mut result = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        result.push(DirEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: entry.path(),
            kind,
        });
    }

    result.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
    Ok(result)
}
