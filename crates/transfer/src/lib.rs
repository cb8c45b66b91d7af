//! Copy execution for the distributed file data plane.
//!
//! A copy request becomes a [`TransferTask`]. Local sources are reproduced
//! by the [`LocalCopyEngine`] on the caller's thread while a
//! [`ProgressWatcher`] turns filesystem events into progress callbacks.
//! Remote sources go through a [`RemoteSessionBridge`], which waits for the
//! peer daemon and then moves the staged result into the sandbox.

mod local;
mod manager;
mod progress;
mod remote;
mod remote_manager;
mod sendfile;
mod task;

pub use local::{CopyPhase, LocalCopyEngine, MediaProvider};
pub use manager::CopyManager;
pub use progress::{ProgressCallback, ProgressWatcher};
pub use remote::{
    DaemonProxy, RemoteCopyInfo, RemoteSession, RemoteSessionBridge, SessionInfo,
    SessionListener, SessionState, copy_update_existing,
};
pub use remote_manager::RemoteCopyManager;
pub use task::{RemoteCancel, TaskHandle, TaskKey, TaskRegistration, TaskTable, TransferTask};

pub use dfs_protocol::constants::{COPY_CHUNK_SIZE, PROGRESS_NOTIFY_INTERVAL};

use dfs_file_ops::FileOpsError;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("illegal path: {0}")]
    IllegalPath(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cancelled")]
    Cancelled,

    #[error("remote session failed with code {0}")]
    SessionFailed(i32),

    #[error("progress watcher failed: {0}")]
    Watcher(String),
}

impl TransferError {
    /// Whether this is the cooperative-stop status rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }

    /// errno-style code reported to cross-process listeners.
    pub fn code(&self) -> i32 {
        match self {
            TransferError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            TransferError::InvalidArgument(_) | TransferError::IllegalPath(_) => libc::EINVAL,
            TransferError::NotFound(_) => libc::ENOENT,
            TransferError::PermissionDenied(_) => libc::EPERM,
            TransferError::Transport(_) | TransferError::Watcher(_) => libc::EIO,
            TransferError::Cancelled => libc::ECANCELED,
            TransferError::SessionFailed(code) => *code,
        }
    }
}

impl From<FileOpsError> for TransferError {
    fn from(err: FileOpsError) -> Self {
        match err {
            FileOpsError::Io(e) => TransferError::Io(e),
            FileOpsError::InvalidUri(msg) | FileOpsError::Ambiguous(msg) => {
                TransferError::InvalidArgument(msg)
            }
            FileOpsError::IllegalPath(msg) => TransferError::IllegalPath(msg),
            FileOpsError::NotFound(msg) => TransferError::NotFound(msg),
        }
    }
}

impl From<notify::Error> for TransferError {
    fn from(err: notify::Error) -> Self {
        TransferError::Watcher(err.to_string())
    }
}
