//! Error types for path resolution.

/// Errors produced by the file-ops crate.
#[derive(Debug, thiserror::Error)]
pub enum FileOpsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid uri: {0}")]
    InvalidUri(String),

    #[error("illegal path: {0}")]
    IllegalPath(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("neither a regular file nor a directory: {0}")]
    Ambiguous(String),
}
