use std::path::Path;

use crate::FileOpsError;

/// Size of a file, or of every regular file below a directory.
pub fn size_of_path(path: &Path) -> Result<u64, FileOpsError> {
    let meta = std::fs::metadata(path)
        .map_err(|_| FileOpsError::NotFound(path.display().to_string()))?;
    if meta.is_dir() {
        dir_size(path)
    } else {
        Ok(meta.len())
    }
}

/// Recursive size of a directory.
///
/// Symlinks are skipped, not followed. Any read error aborts the walk.
pub fn dir_size(path: &Path) -> Result<u64, FileOpsError> {
    let mut total = 0u64;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            tracing::debug!(path = %entry.path().display(), "skipping symlink in size walk");
            continue;
        }
        if file_type.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_nested_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a"), vec![1u8; 100]).unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/b"), vec![1u8; 23]).unwrap();
        assert_eq!(dir_size(tmp.path()).unwrap(), 123);
    }

    #[test]
    fn file_size() {
        let tmp = tempfile::tempdir().unwrap();
        let f = tmp.path().join("f");
        std::fs::write(&f, "12345").unwrap();
        assert_eq!(size_of_path(&f).unwrap(), 5);
    }

    #[test]
    fn empty_dir_is_zero() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(size_of_path(tmp.path()).unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_counted() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("big"), vec![0u8; 4096]).unwrap();
        std::fs::write(tmp.path().join("small"), vec![0u8; 8]).unwrap();
        std::os::unix::fs::symlink(outside.path().join("big"), tmp.path().join("link")).unwrap();
        std::os::unix::fs::symlink(outside.path(), tmp.path().join("dirlink")).unwrap();
        assert_eq!(dir_size(tmp.path()).unwrap(), 8);
    }

    #[test]
    fn missing_path_is_not_found() {
        assert!(matches!(
            size_of_path(Path::new("/no/such/path")),
            Err(FileOpsError::NotFound(_))
        ));
    }
}
