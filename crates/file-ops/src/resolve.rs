//! URI to physical path resolution.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::uri::{FileUri, strip_network_param};
use crate::validation::is_path_valid;
use crate::{FileOpsError, size};

/// Maps a URI and a user id to a physical path.
///
/// This is the sandbox capability boundary: implementations decide where a
/// bundle's files live. Results are still checked for traversal by
/// [`PathResolver`].
pub trait SandboxResolver: Send + Sync {
    fn physical_path(&self, uri: &FileUri, user_id: u32) -> Result<PathBuf, FileOpsError>;
}

/// Directory-per-bundle sandbox layout.
///
/// `file://<bundle>/<path>` maps to `<root>/<user>/<bundle>/<path>`; a URI
/// with an empty authority is taken as a literal absolute path.
#[derive(Debug, Clone)]
pub struct SandboxLayout {
    root: PathBuf,
}

impl SandboxLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding `bundle`'s files for `user_id`.
    pub fn bundle_root(&self, user_id: u32, bundle: &str) -> PathBuf {
        self.root.join(user_id.to_string()).join(bundle)
    }
}

impl SandboxResolver for SandboxLayout {
    fn physical_path(&self, uri: &FileUri, user_id: u32) -> Result<PathBuf, FileOpsError> {
        if uri.authority.is_empty() {
            return Ok(PathBuf::from(&uri.path));
        }
        if uri.is_media() {
            return Err(FileOpsError::InvalidUri(format!(
                "media uri has no sandbox path: {}",
                uri.path
            )));
        }
        Ok(self
            .bundle_root(user_id, &uri.authority)
            .join(uri.path.trim_start_matches('/')))
    }
}

/// Kind of an existing path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

/// Resolves URIs for one user through a [`SandboxResolver`].
#[derive(Clone)]
pub struct PathResolver {
    sandbox: Arc<dyn SandboxResolver>,
    user_id: u32,
}

impl PathResolver {
    pub fn new(sandbox: Arc<dyn SandboxResolver>, user_id: u32) -> Self {
        Self { sandbox, user_id }
    }

    /// Same sandbox, different user.
    pub fn for_user(&self, user_id: u32) -> Self {
        Self {
            sandbox: Arc::clone(&self.sandbox),
            user_id,
        }
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    /// Resolves `uri` to a physical path.
    ///
    /// The `?networkid=` suffix is ignored. Traversal in either the URI or
    /// the mapped path fails with [`FileOpsError::IllegalPath`]. A source
    /// must exist; a destination may not yet.
    pub fn resolve(&self, uri: &str, is_source: bool) -> Result<PathBuf, FileOpsError> {
        let real = strip_network_param(uri);
        if real.is_empty() {
            return Err(FileOpsError::InvalidUri("empty uri".into()));
        }
        if !is_path_valid(real) {
            return Err(FileOpsError::IllegalPath(real.to_string()));
        }

        let parsed = FileUri::parse(real)?;
        let path = self.sandbox.physical_path(&parsed, self.user_id)?;
        if !is_path_valid(&path.to_string_lossy()) {
            return Err(FileOpsError::IllegalPath(path.display().to_string()));
        }

        if is_source && std::fs::symlink_metadata(&path).is_err() {
            return Err(FileOpsError::NotFound(path.display().to_string()));
        }
        Ok(path)
    }

    /// Byte size of the file or directory tree behind `uri`.
    pub fn size_of(&self, uri: &str, is_source: bool) -> Result<u64, FileOpsError> {
        let path = self.resolve(uri, is_source)?;
        size::size_of_path(&path)
    }
}

/// Classifies an existing path, following symlinks like `stat`.
pub fn classify(path: &Path) -> Result<PathKind, FileOpsError> {
    let meta = std::fs::metadata(path)
        .map_err(|_| FileOpsError::NotFound(path.display().to_string()))?;
    match (meta.is_file(), meta.is_dir()) {
        (true, false) => Ok(PathKind::File),
        (false, true) => Ok(PathKind::Directory),
        _ => Err(FileOpsError::Ambiguous(path.display().to_string())),
    }
}
