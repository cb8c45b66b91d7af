use std::path::{Component, Path};

use crate::FileOpsError;

/// Cheap textual traversal check applied to URIs and resolved paths.
///
/// Rejects anything containing `../` or ending in `/..`.
pub fn is_path_valid(path: &str) -> bool {
    !(path.contains("../") || path.ends_with("/..") || path == "..")
}

/// Validates that a relative path stays inside its base directory.
///
/// Rejects:
/// - Empty paths
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_relative_path(file_path: &str) -> Result<(), FileOpsError> {
    if file_path.is_empty() {
        return Err(FileOpsError::IllegalPath("empty path".into()));
    }

    let path = Path::new(file_path);

    if path.is_absolute() {
        return Err(FileOpsError::IllegalPath(format!(
            "absolute path not allowed: {file_path}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(FileOpsError::IllegalPath(format!(
                    "parent directory traversal not allowed: {file_path}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(FileOpsError::IllegalPath(format!(
                    "absolute path not allowed: {file_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}
