use std::path::PathBuf;
use std::sync::Arc;

use dfs_file_ops::{FileUri, PathKind, classify, ensure_dir, strip_network_param};
use dfs_protocol::constants::ACCOUNT_DATA_INFIX;

use crate::{CopyManager, ProgressCallback, SessionListener, TaskKey, TransferError};

/// Daemon-side half of a cross-device copy.
///
/// A peer asks this device to copy one of its local files into the peer's
/// staging directory, which is reachable here through the distributed
/// mount at `<hmdfs_root>/<user>/account/data/<bundle>/<staging>`.
pub struct RemoteCopyManager {
    copies: CopyManager,
    hmdfs_root: PathBuf,
}

impl RemoteCopyManager {
    pub fn new(copies: CopyManager, hmdfs_root: impl Into<PathBuf>) -> Self {
        Self {
            copies,
            hmdfs_root: hmdfs_root.into(),
        }
    }

    pub fn copies(&self) -> &CopyManager {
        &self.copies
    }

    /// Runs a copy requested by a peer and reports the outcome to `listener`.
    pub fn remote_copy(
        &self,
        src_uri: &str,
        dst_uri: &str,
        listener: Arc<dyn SessionListener>,
        user_id: u32,
        staging_subpath: &str,
        caller_uid: u32,
    ) -> Result<(), TransferError> {
        let src_uri = strip_network_param(src_uri);
        let dst_uri = strip_network_param(dst_uri);

        let forward = Arc::clone(&listener);
        let on_progress: ProgressCallback =
            Arc::new(move |processed, total| forward.on_progress(processed, total));

        let result = self.run_copy(
            src_uri,
            dst_uri,
            on_progress,
            user_id,
            staging_subpath,
            caller_uid,
        );
        match &result {
            Ok(()) => listener.on_finished(""),
            Err(e) => {
                tracing::warn!(src = src_uri, error = %e, "remote copy failed");
                listener.on_failed("", e.code());
            }
        }
        result
    }

    /// Cancels a copy started by `caller_uid`. Another caller's copy is
    /// refused.
    pub fn remote_cancel(
        &self,
        src_uri: &str,
        dst_uri: &str,
        caller_uid: u32,
    ) -> Result<(), TransferError> {
        let key = TaskKey::new(strip_network_param(src_uri), strip_network_param(dst_uri));
        let Some(handle) = self.copies.tasks().get(&key) else {
            tracing::debug!(src = src_uri, "no remote copy to cancel");
            return Ok(());
        };
        if handle.caller_uid() != caller_uid {
            return Err(TransferError::PermissionDenied(format!(
                "uid {caller_uid} does not own the copy of {src_uri}"
            )));
        }
        self.copies.tasks().cancel(&key, true);
        Ok(())
    }

    fn run_copy(
        &self,
        src_uri: &str,
        dst_uri: &str,
        on_progress: ProgressCallback,
        user_id: u32,
        staging_subpath: &str,
        caller_uid: u32,
    ) -> Result<(), TransferError> {
        let resolver = self.copies.resolver().for_user(user_id);
        let dst = FileUri::parse(dst_uri)?;
        let dst_path = if dst.is_docs() || dst.is_media() {
            None
        } else {
            Some(self.staged_destination(src_uri, &dst, user_id, staging_subpath)?)
        };
        self.copies.copy_as(
            &resolver,
            src_uri,
            dst_uri,
            dst_path,
            Some(on_progress),
            caller_uid,
        )
    }

    fn staged_destination(
        &self,
        src_uri: &str,
        dst: &FileUri,
        user_id: u32,
        staging_subpath: &str,
    ) -> Result<PathBuf, TransferError> {
        let staging = self
            .hmdfs_root
            .join(user_id.to_string())
            .join(ACCOUNT_DATA_INFIX)
            .join(&dst.authority)
            .join(staging_subpath.trim_start_matches('/'));

        let src_path = self.copies.resolver().for_user(user_id).resolve(src_uri, true)?;
        if classify(&src_path)? == PathKind::File {
            Ok(staging.join(FileUri::parse(src_uri)?.file_name()))
        } else {
            ensure_dir(&staging)?;
            Ok(staging)
        }
    }
}
