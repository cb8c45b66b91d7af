//! Cleanup of staging and partially written state.

use std::path::Path;

use crate::FileOpsError;

/// Removes a directory tree. A missing tree is not an error.
pub fn remove_tree(path: &Path) -> Result<(), FileOpsError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed directory tree");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Removes a file, or an empty directory. A missing path is not an error.
pub fn remove_path(path: &Path) -> Result<(), FileOpsError> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if meta.is_dir() {
        std::fs::remove_dir(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    Ok(())
}
