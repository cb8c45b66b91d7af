//! Cross-device copy through a peer daemon session.
//!
//! The peer writes into a private staging directory; once the session
//! listener reports success the staged tree is merged into the caller's
//! sandbox. The staging directory is removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use dfs_file_ops::{
    EntryKind, FileUri, ensure_dir, ensure_parent, list_directory, remove_tree,
    strip_network_param,
};
use rand::Rng;

use crate::{ProgressCallback, RemoteCancel, TransferError};

/// Session parameters exchanged with the peer daemon.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    /// Authority of the destination URI.
    pub authority: String,
    /// Physical destination in the caller's sandbox.
    pub sandbox_path: PathBuf,
    /// Name of the staging directory, relative to the staging root.
    pub copy_path: String,
    /// Full path of the staging directory, when one is used.
    pub staging_dir: Option<PathBuf>,
    /// Whether the destination already existed as a directory.
    pub dir_exist_flag: bool,
    /// Filled in by the daemon once the session is open.
    pub session_name: String,
}

/// Shape of a remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteCopyInfo {
    pub is_file: bool,
    pub is_dir: bool,
}

/// Completion signals of a remote session, delivered on daemon threads.
pub trait SessionListener: Send + Sync {
    fn on_progress(&self, processed: u64, total: u64);
    fn on_finished(&self, session_name: &str);
    fn on_failed(&self, session_name: &str, code: i32);
}

/// Request/response calls into the daemon of a peer device.
pub trait DaemonProxy: Send + Sync {
    fn prepare_session(
        &self,
        src_uri: &str,
        dst_uri: &str,
        src_device_id: &str,
        listener: Arc<dyn SessionListener>,
        info: &mut SessionInfo,
    ) -> Result<(), TransferError>;

    fn cancel_copy_task(&self, session_name: &str) -> Result<(), TransferError>;

    fn request_send_file(
        &self,
        src_uri: &str,
        dst_path: &str,
        dst_device_id: &str,
        session_name: &str,
    ) -> Result<(), TransferError>;

    fn get_remote_copy_info(&self, src_uri: &str) -> Result<RemoteCopyInfo, TransferError>;
}

/// Terminal-once state of a remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Success,
    Failed(i32),
}

/// Listener side of one remote session: a two-state latch plus progress
/// forwarding and cancel plumbing.
pub struct RemoteSession {
    state: Mutex<SessionState>,
    cond: Condvar,
    session_name: Mutex<String>,
    cancel_requested: AtomicBool,
    proxy: Arc<dyn DaemonProxy>,
    progress: Option<ProgressCallback>,
}

impl RemoteSession {
    pub fn new(proxy: Arc<dyn DaemonProxy>, progress: Option<ProgressCallback>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState::Pending),
            cond: Condvar::new(),
            session_name: Mutex::new(String::new()),
            cancel_requested: AtomicBool::new(false),
            proxy,
            progress,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    pub fn session_name(&self) -> String {
        self.session_name.lock().unwrap().clone()
    }

    /// Blocks until the session settles. Returns the failure code on failure.
    pub fn wait(&self) -> Result<(), i32> {
        let mut state = self.state.lock().unwrap();
        loop {
            match *state {
                SessionState::Pending => state = self.cond.wait(state).unwrap(),
                SessionState::Success => return Ok(()),
                SessionState::Failed(code) => return Err(code),
            }
        }
    }

    /// Records the daemon-assigned name, forwarding a cancel that arrived
    /// before the name was known.
    fn set_session_name(&self, name: &str) {
        *self.session_name.lock().unwrap() = name.to_string();
        if self.cancel_requested.load(Ordering::SeqCst) {
            self.forward_cancel(name);
        }
    }

    fn settle(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap();
        if *state != SessionState::Pending {
            tracing::debug!(?next, current = ?*state, "ignoring late session signal");
            return;
        }
        *state = next;
        self.cond.notify_all();
    }

    fn forward_cancel(&self, name: &str) {
        tracing::info!(session = name, "cancelling remote copy");
        if let Err(e) = self.proxy.cancel_copy_task(name) {
            tracing::warn!(session = name, error = %e, "remote cancel failed");
        }
    }
}

impl SessionListener for RemoteSession {
    fn on_progress(&self, processed: u64, total: u64) {
        if let Some(cb) = &self.progress {
            cb(processed, total);
        }
    }

    fn on_finished(&self, session_name: &str) {
        tracing::info!(session = session_name, "remote session finished");
        self.settle(SessionState::Success);
    }

    fn on_failed(&self, session_name: &str, code: i32) {
        tracing::warn!(session = session_name, code, "remote session failed");
        self.settle(SessionState::Failed(code));
    }
}

impl RemoteCancel for RemoteSession {
    fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        let name = self.session_name();
        if name.is_empty() {
            tracing::debug!("cancel queued until the session is named");
            return;
        }
        self.forward_cancel(&name);
    }
}

/// Randomly named staging directory, removed on drop.
struct StagingDir {
    path: PathBuf,
    token: String,
}

impl StagingDir {
    fn create(root: &Path) -> Result<Self, TransferError> {
        ensure_dir(root)?;
        loop {
            let mut bytes = [0u8; 8];
            rand::thread_rng().fill(&mut bytes);
            let token = hex::encode(bytes);
            let path = root.join(&token);
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "created staging directory");
                    return Ok(Self { path, token });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = remove_tree(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove staging directory");
        }
    }
}

/// Runs one remote copy: prepare, wait, merge, clean up.
pub struct RemoteSessionBridge {
    proxy: Arc<dyn DaemonProxy>,
    session: Arc<RemoteSession>,
    staging: Option<StagingDir>,
    info: SessionInfo,
}

impl RemoteSessionBridge {
    /// Allocates the staging directory for a copy landing at `dst_path`.
    ///
    /// `docs` and `media` destinations are written by the peer directly and
    /// get no staging directory.
    pub fn new(
        dst_uri: &str,
        dst_path: PathBuf,
        staging_root: &Path,
        proxy: Arc<dyn DaemonProxy>,
        progress: Option<ProgressCallback>,
    ) -> Result<Self, TransferError> {
        let uri = FileUri::parse(strip_network_param(dst_uri))?;
        let staging = if uri.is_docs() || uri.is_media() {
            None
        } else {
            Some(StagingDir::create(staging_root)?)
        };

        let info = SessionInfo {
            authority: uri.authority,
            dir_exist_flag: dst_path.is_dir(),
            sandbox_path: dst_path,
            copy_path: staging.as_ref().map(|s| s.token.clone()).unwrap_or_default(),
            staging_dir: staging.as_ref().map(|s| s.path.clone()),
            session_name: String::new(),
        };

        Ok(Self {
            session: RemoteSession::new(Arc::clone(&proxy), progress),
            proxy,
            staging,
            info,
        })
    }

    pub fn session(&self) -> &Arc<RemoteSession> {
        &self.session
    }

    pub fn staging_dir(&self) -> Option<&Path> {
        self.info.staging_dir.as_deref()
    }

    /// Drives the session to completion on the calling thread.
    pub fn execute(
        mut self,
        src_uri: &str,
        dst_uri: &str,
        src_device_id: &str,
    ) -> Result<(), TransferError> {
        let listener: Arc<dyn SessionListener> = self.session.clone();
        if let Err(e) = self.proxy.prepare_session(
            src_uri,
            dst_uri,
            src_device_id,
            listener,
            &mut self.info,
        ) {
            tracing::error!(src = src_uri, error = %e, "prepare session failed");
            return Err(e);
        }
        self.session.set_session_name(&self.info.session_name);

        self.session.wait().map_err(TransferError::SessionFailed)?;
        self.copy_to_sandbox(src_uri)
    }

    fn copy_to_sandbox(&self, src_uri: &str) -> Result<(), TransferError> {
        let Some(staging) = &self.staging else {
            return Ok(());
        };
        let sandbox = &self.info.sandbox_path;

        if sandbox.is_dir() {
            copy_update_existing(&staging.path, sandbox)?;
        } else {
            let uri = FileUri::parse(strip_network_param(src_uri))?;
            copy_file_update(&staging.path.join(uri.file_name()), sandbox)?;
        }
        tracing::info!(dst = %sandbox.display(), "remote copy materialized");
        Ok(())
    }
}

/// Recursively merges `src` into `dst`.
///
/// A file is written only when the destination is missing or older than
/// the source; nothing in `dst` is ever deleted.
pub fn copy_update_existing(src: &Path, dst: &Path) -> Result<(), TransferError> {
    ensure_dir(dst)?;
    for entry in list_directory(src)? {
        let target = dst.join(&entry.name);
        match entry.kind {
            EntryKind::Directory => copy_update_existing(&entry.path, &target)?,
            EntryKind::File => {
                copy_file_update(&entry.path, &target)?;
            }
            EntryKind::Symlink | EntryKind::Other => {
                tracing::debug!(path = %entry.path.display(), "skipping non-regular entry");
            }
        }
    }
    Ok(())
}

fn copy_file_update(src: &Path, dst: &Path) -> Result<bool, TransferError> {
    let src_modified = std::fs::metadata(src)?.modified()?;
    if let Ok(dst_meta) = std::fs::metadata(dst) {
        if dst_meta.modified()? >= src_modified {
            return Ok(false);
        }
    }
    ensure_parent(dst)?;
    std::fs::copy(src, dst)?;
    Ok(true)
}
