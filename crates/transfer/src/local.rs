use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use dfs_file_ops::{EntryKind, ensure_dir, list_directory, remove_path};

use crate::sendfile::send_chunk;
use crate::{COPY_CHUNK_SIZE, ProgressWatcher, TransferError};

/// Opens media-library items, which have no stable filesystem path.
pub trait MediaProvider: Send + Sync {
    fn open(&self, uri: &str) -> std::io::Result<File>;
}

/// Where a [`LocalCopyEngine`] is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPhase {
    Init,
    FileCopy,
    DirWalk,
    Done,
    Failed,
    Cancelled,
}

/// Reproduces a file or directory tree at a destination.
///
/// Runs synchronously on the calling thread, polling the task's cancel flag
/// before every chunk and every directory entry.
pub struct LocalCopyEngine<'a> {
    cancel: &'a AtomicBool,
    watcher: &'a ProgressWatcher,
    media: Option<&'a dyn MediaProvider>,
    phase: CopyPhase,
    created: Vec<PathBuf>,
}

impl<'a> LocalCopyEngine<'a> {
    pub fn new(cancel: &'a AtomicBool, watcher: &'a ProgressWatcher) -> Self {
        Self {
            cancel,
            watcher,
            media: None,
            phase: CopyPhase::Init,
            created: Vec::new(),
        }
    }

    pub fn with_media(mut self, media: Option<&'a dyn MediaProvider>) -> Self {
        self.media = media;
        self
    }

    pub fn phase(&self) -> CopyPhase {
        self.phase
    }

    /// Paths this engine created, in creation order.
    pub fn created(&self) -> &[PathBuf] {
        &self.created
    }

    /// Copies `src` (a file) onto the file `dst`.
    pub fn run_file(&mut self, src: &Path, dst: &Path) -> Result<(), TransferError> {
        self.phase = CopyPhase::FileCopy;
        let result = self.copy_file(src, dst);
        self.finish(result)
    }

    /// Copies the media item `uri` onto the file `dst`.
    pub fn run_media(&mut self, uri: &str, dst: &Path) -> Result<(), TransferError> {
        self.phase = CopyPhase::FileCopy;
        let result = self.copy_media(uri, dst);
        self.finish(result)
    }

    /// Copies the directory `src` into `dst` as `dst/<leaf of src>`.
    pub fn run_dir(&mut self, src: &Path, dst: &Path) -> Result<(), TransferError> {
        self.phase = CopyPhase::DirWalk;
        let result = self.copy_dir(src, dst);
        self.finish(result)
    }

    /// Creates the destination file of a single-file copy if it is missing.
    pub fn ensure_file(&mut self, dst: &Path) -> Result<(), TransferError> {
        if dst.exists() {
            return Ok(());
        }
        dfs_file_ops::ensure_parent(dst)?;
        open_destination(dst)?;
        self.created.push(dst.to_path_buf());
        Ok(())
    }

    /// Removes everything this engine created, newest first.
    pub fn discard_created(&mut self) {
        for path in self.created.drain(..).rev() {
            if let Err(e) = remove_path(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to discard partial copy");
            }
        }
    }

    fn finish(&mut self, result: Result<(), TransferError>) -> Result<(), TransferError> {
        self.phase = match &result {
            Ok(()) => CopyPhase::Done,
            Err(e) if e.is_cancelled() => CopyPhase::Cancelled,
            Err(_) => CopyPhase::Failed,
        };
        result
    }

    fn check_cancel(&self) -> Result<(), TransferError> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err(TransferError::Cancelled);
        }
        Ok(())
    }

    fn copy_file(&mut self, src: &Path, dst: &Path) -> Result<(), TransferError> {
        if src == dst {
            tracing::debug!(path = %src.display(), "source equals destination, nothing to copy");
            return Ok(());
        }
        self.watcher.register(dst);
        let source = File::open(src)?;
        let dest = self.create_destination(dst)?;
        self.transfer(&source, &dest)
    }

    fn copy_media(&mut self, uri: &str, dst: &Path) -> Result<(), TransferError> {
        let media = self.media.ok_or_else(|| {
            TransferError::PermissionDenied(format!("no media provider for {uri}"))
        })?;
        self.watcher.register(dst);
        let source = media.open(uri)?;
        let dest = self.create_destination(dst)?;
        self.transfer(&source, &dest)
    }

    fn create_destination(&mut self, dst: &Path) -> Result<File, TransferError> {
        let existed = dst.exists();
        let file = open_destination(dst)?;
        if !existed {
            self.created.push(dst.to_path_buf());
        }
        Ok(file)
    }

    fn transfer(&self, source: &File, dest: &File) -> Result<(), TransferError> {
        let mut remaining = source.metadata()?.len();
        loop {
            self.check_cancel()?;
            let sent = send_chunk(source, dest, COPY_CHUNK_SIZE)?;
            if sent == 0 {
                break;
            }
            remaining = remaining.saturating_sub(sent as u64);
        }
        if remaining != 0 {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("source ended with {remaining} bytes unsent"),
            )));
        }
        Ok(())
    }

    fn copy_dir(&mut self, src: &Path, dst: &Path) -> Result<(), TransferError> {
        if dst.starts_with(src) {
            return Err(TransferError::InvalidArgument(format!(
                "cannot copy {} into its own subtree {}",
                src.display(),
                dst.display()
            )));
        }
        let leaf = src.file_name().ok_or_else(|| {
            TransferError::InvalidArgument(format!("source has no name: {}", src.display()))
        })?;
        self.copy_sub_dir(src, &dst.join(leaf))
    }

    fn copy_sub_dir(&mut self, src: &Path, dst: &Path) -> Result<(), TransferError> {
        if !dst.exists() {
            ensure_dir(dst)?;
            self.created.push(dst.to_path_buf());
        }
        self.watcher.watch(dst)?;

        for entry in list_directory(src)? {
            self.check_cancel()?;
            let target = dst.join(&entry.name);
            match entry.kind {
                EntryKind::Directory => self.copy_sub_dir(&entry.path, &target)?,
                EntryKind::File => self.copy_file(&entry.path, &target)?,
                EntryKind::Symlink => {
                    tracing::debug!(path = %entry.path.display(), "skipping symlink");
                }
                EntryKind::Other => {
                    tracing::debug!(path = %entry.path.display(), "skipping special file");
                }
            }
        }
        Ok(())
    }
}

fn open_destination(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(dfs_file_ops::FILE_MODE);
    }
    options.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_watcher() -> ProgressWatcher {
        ProgressWatcher::new(0, true, None)
    }

    #[test]
    fn copies_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src.txt");
        let dst = tmp.path().join("dst.txt");
        std::fs::write(&src, b"payload").unwrap();

        let cancel = AtomicBool::new(false);
        let watcher = idle_watcher();
        let mut engine = LocalCopyEngine::new(&cancel, &watcher);
        engine.run_file(&src, &dst).unwrap();

        assert_eq!(std::fs::read(&dst).unwrap(), b"payload");
        assert_eq!(engine.phase(), CopyPhase::Done);
        assert_eq!(engine.created(), &[dst]);
    }

    #[test]
    fn copying_a_file_onto_itself_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("same.txt");
        std::fs::write(&src, b"keep me").unwrap();
        let before = std::fs::metadata(&src).unwrap().modified().unwrap();

        let cancel = AtomicBool::new(false);
        let watcher = idle_watcher();
        let mut engine = LocalCopyEngine::new(&cancel, &watcher);
        engine.run_file(&src, &src).unwrap();

        assert_eq!(std::fs::read(&src).unwrap(), b"keep me");
        assert_eq!(std::fs::metadata(&src).unwrap().modified().unwrap(), before);
        assert!(engine.created().is_empty());
    }

    #[test]
    fn truncates_an_existing_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        std::fs::write(&src, b"short").unwrap();
        std::fs::write(&dst, b"a much longer previous content").unwrap();

        let cancel = AtomicBool::new(false);
        let watcher = idle_watcher();
        LocalCopyEngine::new(&cancel, &watcher)
            .run_file(&src, &dst)
            .unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"short");
    }

    #[test]
    fn multi_chunk_file_is_byte_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("big");
        let dst = tmp.path().join("big.copy");
        let data: Vec<u8> = (0..(COPY_CHUNK_SIZE + 12_345))
            .map(|i| (i % 253) as u8)
            .collect();
        std::fs::write(&src, &data).unwrap();

        let cancel = AtomicBool::new(false);
        let watcher = idle_watcher();
        LocalCopyEngine::new(&cancel, &watcher)
            .run_file(&src, &dst)
            .unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), data);
    }

    #[test]
    fn cancel_stops_before_remaining_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("big");
        let dst = tmp.path().join("big.copy");
        std::fs::write(&src, vec![1u8; COPY_CHUNK_SIZE * 2]).unwrap();

        let cancel = AtomicBool::new(true);
        let watcher = idle_watcher();
        let mut engine = LocalCopyEngine::new(&cancel, &watcher);
        let err = engine.run_file(&src, &dst).unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(engine.phase(), CopyPhase::Cancelled);
        assert!(std::fs::metadata(&dst).unwrap().len() < (COPY_CHUNK_SIZE * 2) as u64);

        engine.discard_created();
        assert!(!dst.exists());
    }

    #[test]
    fn copies_a_tree_under_its_leaf_name() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("album");
        std::fs::create_dir_all(src.join("nested/deeper")).unwrap();
        std::fs::write(src.join("a.txt"), b"a").unwrap();
        std::fs::write(src.join("nested/b.txt"), b"bb").unwrap();
        std::fs::write(src.join("nested/deeper/c.txt"), b"ccc").unwrap();
        let dst = tmp.path().join("out");
        std::fs::create_dir(&dst).unwrap();

        let cancel = AtomicBool::new(false);
        let watcher = ProgressWatcher::new(6, false, None);
        let mut engine = LocalCopyEngine::new(&cancel, &watcher);
        engine.run_dir(&src, &dst).unwrap();

        assert_eq!(std::fs::read(dst.join("album/a.txt")).unwrap(), b"a");
        assert_eq!(std::fs::read(dst.join("album/nested/b.txt")).unwrap(), b"bb");
        assert_eq!(
            std::fs::read(dst.join("album/nested/deeper/c.txt")).unwrap(),
            b"ccc"
        );
        assert_eq!(engine.phase(), CopyPhase::Done);
    }

    #[test]
    fn refuses_copy_into_own_subtree() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("d");
        std::fs::create_dir_all(src.join("inner")).unwrap();
        std::fs::write(src.join("f"), b"x").unwrap();

        let cancel = AtomicBool::new(false);
        let watcher = ProgressWatcher::new(1, false, None);
        let mut engine = LocalCopyEngine::new(&cancel, &watcher);
        let err = engine.run_dir(&src, &src.join("inner")).unwrap_err();

        assert!(matches!(err, TransferError::InvalidArgument(_)));
        assert_eq!(engine.phase(), CopyPhase::Failed);
        assert!(!src.join("inner/d").exists());
        assert!(engine.created().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("s");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("real"), b"r").unwrap();
        std::os::unix::fs::symlink(src.join("real"), src.join("link")).unwrap();
        let dst = tmp.path().join("o");
        std::fs::create_dir(&dst).unwrap();

        let cancel = AtomicBool::new(false);
        let watcher = ProgressWatcher::new(1, false, None);
        LocalCopyEngine::new(&cancel, &watcher)
            .run_dir(&src, &dst)
            .unwrap();

        assert!(dst.join("s/real").exists());
        assert!(std::fs::symlink_metadata(dst.join("s/link")).is_err());
    }

    #[test]
    fn media_without_provider_is_denied() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let watcher = idle_watcher();
        let err = LocalCopyEngine::new(&cancel, &watcher)
            .run_media("file://media/Photo/1/a.jpg", &tmp.path().join("a.jpg"))
            .unwrap_err();
        assert!(matches!(err, TransferError::PermissionDenied(_)));
    }

    #[test]
    fn media_is_read_through_the_provider() {
        struct Fixture(PathBuf);
        impl MediaProvider for Fixture {
            fn open(&self, _uri: &str) -> std::io::Result<File> {
                File::open(&self.0)
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let backing = tmp.path().join("backing.jpg");
        std::fs::write(&backing, b"jpeg bytes").unwrap();
        let provider = Fixture(backing);
        let dst = tmp.path().join("copy.jpg");

        let cancel = AtomicBool::new(false);
        let watcher = idle_watcher();
        LocalCopyEngine::new(&cancel, &watcher)
            .with_media(Some(&provider))
            .run_media("file://media/Photo/1/a.jpg", &dst)
            .unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn ensure_file_records_creation() {
        let tmp = tempfile::tempdir().unwrap();
        let dst = tmp.path().join("sub/new.txt");
        let cancel = AtomicBool::new(false);
        let watcher = idle_watcher();
        let mut engine = LocalCopyEngine::new(&cancel, &watcher);
        engine.ensure_file(&dst).unwrap();
        assert!(dst.is_file());
        assert_eq!(engine.created(), &[dst.clone()]);
        engine.discard_created();
        assert!(!dst.exists());
    }
}
