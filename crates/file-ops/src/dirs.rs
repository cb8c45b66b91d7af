//! Directory creation with transfer permissions.

use std::path::Path;

use crate::FileOpsError;

/// Creates `path` and any missing ancestors.
pub fn ensure_dir(path: &Path) -> Result<(), FileOpsError> {
    if path.is_dir() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(crate::DIR_MODE)
            .create(path)?;
    }

    #[cfg(not(unix))]
    std::fs::create_dir_all(path)?;

    Ok(())
}

/// Creates the parent directory of `path` if needed.
pub fn ensure_parent(path: &Path) -> Result<(), FileOpsError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}
