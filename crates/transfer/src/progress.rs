use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::{PROGRESS_NOTIFY_INTERVAL, TransferError};

/// Callback invoked with `(processed_bytes, total_bytes)`.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

enum WatchMessage {
    Change(notify::Result<Event>),
    Shutdown,
}

struct Progress {
    is_file: bool,
    total: u64,
    processed: u64,
    /// Destination of a single-file copy.
    target: Option<PathBuf>,
    /// Files the engine is going to write (directory copies).
    registered: HashSet<PathBuf>,
    /// Last size observed per registered file.
    seen: HashMap<PathBuf, u64>,
    error: Option<String>,
}

impl Progress {
    fn apply(&mut self, paths: &[PathBuf]) -> std::io::Result<()> {
        for path in paths {
            if self.is_file {
                if self.target.as_deref() == Some(path.as_path()) {
                    self.processed = std::fs::metadata(path)?.len();
                }
                continue;
            }
            if !self.registered.contains(path) {
                continue;
            }
            let size = std::fs::metadata(path)?.len();
            match self.seen.get(path).copied() {
                None => {
                    self.processed += size;
                    self.seen.insert(path.clone(), size);
                }
                Some(prev) if size > prev => {
                    self.processed += size - prev;
                    self.seen.insert(path.clone(), size);
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Re-reads the written sizes so the terminal update does not depend on
    /// how many events were delivered before shutdown.
    fn reconcile(&mut self) {
        if self.is_file {
            if let Some(len) = self
                .target
                .as_ref()
                .and_then(|t| std::fs::metadata(t).ok())
                .map(|m| m.len())
            {
                self.processed = len;
            }
        } else {
            self.processed = self
                .registered
                .iter()
                .filter_map(|p| std::fs::metadata(p).ok())
                .map(|m| m.len())
                .sum();
        }
    }
}

/// Turns filesystem change events on a copy's destination into
/// rate-limited `(processed, total)` callbacks.
///
/// A watcher without a callback, or for a zero-byte source, never spawns its
/// thread. [`stop`](Self::stop) delivers exactly one terminal callback when a
/// callback was supplied.
pub struct ProgressWatcher {
    callback: Option<ProgressCallback>,
    interval: Duration,
    state: Arc<Mutex<Progress>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    sender: mpsc::Sender<WatchMessage>,
    receiver: Mutex<Option<mpsc::Receiver<WatchMessage>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl ProgressWatcher {
    /// Creates a watcher for a transfer of `total` bytes.
    pub fn new(total: u64, is_file: bool, callback: Option<ProgressCallback>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            callback,
            interval: PROGRESS_NOTIFY_INTERVAL,
            state: Arc::new(Mutex::new(Progress {
                is_file,
                total,
                processed: 0,
                target: None,
                registered: HashSet::new(),
                seen: HashMap::new(),
                error: None,
            })),
            watcher: Mutex::new(None),
            sender,
            receiver: Mutex::new(Some(receiver)),
            thread: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Creates a watcher sized after `src`.
    ///
    /// Without a callback the source is not measured at all.
    pub fn for_path(
        src: &Path,
        is_file: bool,
        callback: Option<ProgressCallback>,
    ) -> Result<Self, TransferError> {
        let total = match callback {
            None => 0,
            Some(_) => dfs_file_ops::size_of_path(src)?,
        };
        Ok(Self::new(total, is_file, callback))
    }

    /// Overrides the minimum spacing between intermediate callbacks.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Whether this watcher reports anything before `stop`.
    pub fn is_active(&self) -> bool {
        self.callback.is_some() && self.state.lock().unwrap().total > 0
    }

    pub fn total(&self) -> u64 {
        self.state.lock().unwrap().total
    }

    pub fn processed(&self) -> u64 {
        self.state.lock().unwrap().processed
    }

    /// Error recorded by the watcher thread, if any.
    pub fn error(&self) -> Option<String> {
        self.state.lock().unwrap().error.clone()
    }

    /// Declares a file the engine is about to write.
    pub fn register(&self, path: &Path) {
        let mut state = self.state.lock().unwrap();
        if state.is_file {
            state.target = Some(path.to_path_buf());
        } else {
            state.registered.insert(path.to_path_buf());
        }
    }

    /// Subscribes to modifications of `path` (a file, or a directory whose
    /// direct children are watched).
    pub fn watch(&self, path: &Path) -> Result<(), TransferError> {
        if !self.is_active() {
            return Ok(());
        }

        let mut guard = self.watcher.lock().unwrap();
        if guard.is_none() {
            let sender = self.sender.clone();
            let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
                let _ = sender.send(WatchMessage::Change(res));
            })?;
            *guard = Some(watcher);
        }
        if let Some(watcher) = guard.as_mut() {
            watcher.watch(path, RecursiveMode::NonRecursive)?;
        }
        tracing::trace!(path = %path.display(), "watching for progress");
        Ok(())
    }

    /// Spawns the watcher thread. No-op for an inactive watcher or when
    /// already started.
    pub fn start(&self) {
        if !self.is_active() {
            return;
        }
        let Some(receiver) = self.receiver.lock().unwrap().take() else {
            return;
        };

        let state = Arc::clone(&self.state);
        let callback = self.callback.clone();
        let interval = self.interval;

        let spawned = std::thread::Builder::new()
            .name("progress-watcher".into())
            .spawn(move || watch_loop(receiver, state, callback, interval));
        match spawned {
            Ok(handle) => *self.thread.lock().unwrap() = Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn progress watcher");
                self.state.lock().unwrap().error = Some(e.to_string());
            }
        }
    }

    /// Shuts the thread down, releases every watch and delivers the
    /// terminal callback. Only the first call has any effect.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown_thread();
        self.watcher.lock().unwrap().take();

        let Some(callback) = &self.callback else {
            return;
        };
        let (processed, total) = {
            let mut state = self.state.lock().unwrap();
            if state.error.is_none() {
                state.reconcile();
            }
            (state.processed, state.total)
        };
        callback(processed, total);
    }

    fn shutdown_thread(&self) {
        if let Some(handle) = self.thread.lock().unwrap().take() {
            let _ = self.sender.send(WatchMessage::Shutdown);
            if handle.join().is_err() {
                tracing::error!("progress watcher thread panicked");
            }
        }
    }
}

impl Drop for ProgressWatcher {
    fn drop(&mut self) {
        self.shutdown_thread();
    }
}

fn is_write_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(_)
            | EventKind::Create(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
    )
}

fn watch_loop(
    receiver: mpsc::Receiver<WatchMessage>,
    state: Arc<Mutex<Progress>>,
    callback: Option<ProgressCallback>,
    interval: Duration,
) {
    let mut next_notify = Instant::now();

    while let Ok(message) = receiver.recv() {
        let event = match message {
            WatchMessage::Shutdown => break,
            WatchMessage::Change(Err(e)) => {
                tracing::warn!(error = %e, "change notification failed");
                state.lock().unwrap().error = Some(e.to_string());
                break;
            }
            WatchMessage::Change(Ok(event)) => event,
        };
        if !is_write_event(&event.kind) {
            continue;
        }

        let (processed, total) = {
            let mut state = state.lock().unwrap();
            if let Err(e) = state.apply(&event.paths) {
                tracing::warn!(error = %e, "failed to measure written file");
                state.error = Some(e.to_string());
                break;
            }
            (state.processed, state.total)
        };

        if processed >= total {
            // Everything is on disk; `stop` reports the rest.
            break;
        }
        let now = Instant::now();
        if now >= next_notify {
            if let Some(cb) = &callback {
                cb(processed, total);
            }
            next_notify = now + interval;
        }
    }
}
