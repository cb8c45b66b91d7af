use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use dfs_file_ops::{FileUri, PathKind, PathResolver, classify, is_path_valid, strip_network_param};

use crate::{
    DaemonProxy, LocalCopyEngine, MediaProvider, ProgressCallback, ProgressWatcher, RemoteCancel,
    RemoteSessionBridge, TaskKey, TaskRegistration, TaskTable, TransferError, TransferTask,
};

/// Entry point for copies and cancellations issued by one process.
///
/// Copies run on the calling thread and return once the data is in place,
/// the copy failed, or it was cancelled.
pub struct CopyManager {
    tasks: Arc<TaskTable>,
    resolver: PathResolver,
    staging_root: PathBuf,
    media: Option<Arc<dyn MediaProvider>>,
    daemon: Option<Arc<dyn DaemonProxy>>,
}

impl CopyManager {
    /// `staging_root` receives the private directories of remote copies.
    pub fn new(resolver: PathResolver, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            tasks: TaskTable::new(),
            resolver,
            staging_root: staging_root.into(),
            media: None,
            daemon: None,
        }
    }

    pub fn with_media(mut self, media: Arc<dyn MediaProvider>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_daemon(mut self, daemon: Arc<dyn DaemonProxy>) -> Self {
        self.daemon = Some(daemon);
        self
    }

    pub fn tasks(&self) -> &Arc<TaskTable> {
        &self.tasks
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Copies `src_uri` to `dst_uri`.
    pub fn copy(
        &self,
        src_uri: &str,
        dst_uri: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<(), TransferError> {
        self.copy_as(&self.resolver, src_uri, dst_uri, None, on_progress, 0)
    }

    /// Copies on behalf of `caller_uid`, resolving paths with `resolver`.
    /// `dst_path`, when given, replaces the resolved destination.
    pub(crate) fn copy_as(
        &self,
        resolver: &PathResolver,
        src_uri: &str,
        dst_uri: &str,
        dst_path: Option<PathBuf>,
        on_progress: Option<ProgressCallback>,
        caller_uid: u32,
    ) -> Result<(), TransferError> {
        check_uris(src_uri, dst_uri)?;
        let src = FileUri::parse(src_uri)?;

        let dst_path = match dst_path {
            Some(path) => path,
            None => resolver.resolve(dst_uri, false)?,
        };
        if src.is_remote() {
            return self.copy_remote(src_uri, dst_uri, &src, dst_path, on_progress, caller_uid);
        }

        let (src_path, src_is_file) = if src.is_media() {
            (PathBuf::from(&src.path), true)
        } else {
            let path = resolver.resolve(src_uri, false)?;
            if path == dst_path && !path.is_dir() {
                tracing::debug!(path = %path.display(), "copy onto itself, nothing to do");
                return Ok(());
            }
            let path = resolver.resolve(src_uri, true)?;
            let is_file = classify(&path)? == PathKind::File;
            (path, is_file)
        };

        if src_is_file && src_path == dst_path {
            tracing::debug!(path = %src_path.display(), "copy onto itself, nothing to do");
            return Ok(());
        }

        let registration = self.tasks.register(TaskKey::new(src_uri, dst_uri), caller_uid)?;
        let watcher = self.watcher_for(src_uri, &src, &src_path, src_is_file, on_progress)?;
        let task = TransferTask::new(registration, src_path, dst_path, src_is_file, watcher);

        tracing::info!(
            src = %task.src_path.display(),
            dst = %task.dst_path.display(),
            is_file = task.src_is_file,
            "starting local copy"
        );
        self.run_local(&task, src.is_media())
    }

    /// Cancels the copy of exactly this pair. Unknown pairs are not an error.
    pub fn cancel(&self, src_uri: &str, dst_uri: &str, keep_files: bool) -> Result<(), TransferError> {
        check_uris(src_uri, dst_uri)?;
        if self.tasks.cancel(&TaskKey::new(src_uri, dst_uri), keep_files) {
            tracing::info!(src = src_uri, dst = dst_uri, keep_files, "copy cancelled");
        } else {
            tracing::debug!(src = src_uri, dst = dst_uri, "no active copy to cancel");
        }
        Ok(())
    }

    /// Cancels every active copy.
    pub fn cancel_all(&self, keep_files: bool) -> Result<(), TransferError> {
        let count = self.tasks.cancel_all(keep_files);
        tracing::info!(count, keep_files, "cancelled all copies");
        Ok(())
    }

    fn watcher_for(
        &self,
        src_uri: &str,
        src: &FileUri,
        src_path: &Path,
        src_is_file: bool,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ProgressWatcher, TransferError> {
        if !src.is_media() {
            return ProgressWatcher::for_path(src_path, src_is_file, on_progress);
        }
        let total = match (&on_progress, &self.media) {
            (Some(_), Some(media)) => media.open(strip_network_param(src_uri))?.metadata()?.len(),
            _ => 0,
        };
        Ok(ProgressWatcher::new(total, true, on_progress))
    }

    fn run_local(&self, task: &TransferTask, is_media: bool) -> Result<(), TransferError> {
        let handle = Arc::clone(task.handle());
        let mut engine = LocalCopyEngine::new(handle.cancel_flag(), &task.watcher)
            .with_media(self.media.as_deref());

        let result = self.drive(&mut engine, task, is_media);
        task.watcher.stop();

        match result {
            Err(e) if e.is_cancelled() => {
                if !handle.keep_files() {
                    engine.discard_created();
                }
                tracing::info!(src = %task.src_uri, "copy stopped by cancel");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(src = %task.src_uri, error = %e, "copy failed");
                Err(e)
            }
            Ok(()) => match task.watcher.error() {
                Some(err) => Err(TransferError::Watcher(err)),
                None => Ok(()),
            },
        }
    }

    fn drive(
        &self,
        engine: &mut LocalCopyEngine<'_>,
        task: &TransferTask,
        is_media: bool,
    ) -> Result<(), TransferError> {
        if task.src_is_file {
            engine.ensure_file(&task.dst_path)?;
            task.watcher.watch(&task.dst_path)?;
            task.watcher.start();
            if is_media {
                engine.run_media(strip_network_param(&task.src_uri), &task.dst_path)
            } else {
                engine.run_file(&task.src_path, &task.dst_path)
            }
        } else {
            if !task.dst_path.is_dir() {
                return Err(TransferError::InvalidArgument(format!(
                    "destination of a directory copy must be a directory: {}",
                    task.dst_path.display()
                )));
            }
            task.watcher.watch(&task.dst_path)?;
            task.watcher.start();
            engine.run_dir(&task.src_path, &task.dst_path)
        }
    }

    fn copy_remote(
        &self,
        src_uri: &str,
        dst_uri: &str,
        src: &FileUri,
        dst_path: PathBuf,
        on_progress: Option<ProgressCallback>,
        caller_uid: u32,
    ) -> Result<(), TransferError> {
        let daemon = self
            .daemon
            .clone()
            .ok_or_else(|| TransferError::Transport("no daemon connection".into()))?;
        let device_id = src.network_id.clone().unwrap_or_default();
        let info = daemon.get_remote_copy_info(src_uri)?;

        let registration = self.tasks.register(TaskKey::new(src_uri, dst_uri), caller_uid)?;
        let bridge = RemoteSessionBridge::new(
            dst_uri,
            dst_path.clone(),
            &self.staging_root,
            daemon,
            on_progress,
        )?;
        let session = Arc::clone(bridge.session());
        let weak: Weak<dyn RemoteCancel> = Arc::downgrade(&session) as Weak<dyn RemoteCancel>;
        registration.handle().attach_remote(weak);

        let mut task = remote_task(registration, src, dst_path, info.is_file);
        task.remote = Some(session);

        tracing::info!(src = src_uri, dst = dst_uri, device = %device_id, "starting remote copy");
        let result = bridge.execute(src_uri, dst_uri, &device_id);
        if task.handle().is_cancelled() && result.is_err() {
            return Err(TransferError::Cancelled);
        }
        result
    }
}

fn remote_task(
    registration: TaskRegistration,
    src: &FileUri,
    dst_path: PathBuf,
    is_file: bool,
) -> TransferTask {
    TransferTask::new(
        registration,
        PathBuf::from(&src.path),
        dst_path,
        is_file,
        ProgressWatcher::new(0, is_file, None),
    )
}

fn check_uris(src_uri: &str, dst_uri: &str) -> Result<(), TransferError> {
    for uri in [src_uri, dst_uri] {
        let real = strip_network_param(uri);
        if real.is_empty() {
            return Err(TransferError::InvalidArgument("empty uri".into()));
        }
        if !is_path_valid(real) {
            return Err(TransferError::IllegalPath(real.to_string()));
        }
    }
    Ok(())
}
