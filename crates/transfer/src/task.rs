use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::{ProgressWatcher, RemoteSession, TransferError};

/// Identity of a copy: the `(source, destination)` URI pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey {
    pub src_uri: String,
    pub dst_uri: String,
}

impl TaskKey {
    pub fn new(src_uri: impl Into<String>, dst_uri: impl Into<String>) -> Self {
        Self {
            src_uri: src_uri.into(),
            dst_uri: dst_uri.into(),
        }
    }
}

/// Something that can ask a peer to abandon a session.
pub trait RemoteCancel: Send + Sync {
    fn cancel(&self);
}

/// The cancel-only view of a task, shared with the [`TaskTable`].
pub struct TaskHandle {
    key: TaskKey,
    caller_uid: u32,
    needs_cancel: AtomicBool,
    keep_files: AtomicBool,
    remote: Mutex<Option<Weak<dyn RemoteCancel>>>,
}

impl TaskHandle {
    fn new(key: TaskKey, caller_uid: u32) -> Self {
        Self {
            key,
            caller_uid,
            needs_cancel: AtomicBool::new(false),
            keep_files: AtomicBool::new(true),
            remote: Mutex::new(None),
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn caller_uid(&self) -> u32 {
        self.caller_uid
    }

    pub fn is_cancelled(&self) -> bool {
        self.needs_cancel.load(Ordering::SeqCst)
    }

    /// The flag polled by the copy engine between chunks.
    pub fn cancel_flag(&self) -> &AtomicBool {
        &self.needs_cancel
    }

    /// Whether partially written files survive a cancel.
    pub fn keep_files(&self) -> bool {
        self.keep_files.load(Ordering::SeqCst)
    }

    /// Flags the task and forwards the cancel to its remote session, if any.
    pub fn request_cancel(&self, keep_files: bool) {
        self.keep_files.store(keep_files, Ordering::SeqCst);
        self.needs_cancel.store(true, Ordering::SeqCst);

        let remote = self.remote.lock().unwrap().as_ref().and_then(Weak::upgrade);
        if let Some(remote) = remote {
            remote.cancel();
        }
    }

    /// Links the task to the session that must hear about cancellation.
    pub fn attach_remote(&self, remote: Weak<dyn RemoteCancel>) {
        *self.remote.lock().unwrap() = Some(remote);
    }
}

/// Process-wide table of active copies.
#[derive(Default)]
pub struct TaskTable {
    tasks: Mutex<HashMap<TaskKey, Arc<TaskHandle>>>,
}

impl TaskTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new task. A second active copy of the same pair is refused.
    pub fn register(
        self: &Arc<Self>,
        key: TaskKey,
        caller_uid: u32,
    ) -> Result<TaskRegistration, TransferError> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&key) {
            return Err(TransferError::InvalidArgument(format!(
                "copy already in progress: {} -> {}",
                key.src_uri, key.dst_uri
            )));
        }
        let handle = Arc::new(TaskHandle::new(key.clone(), caller_uid));
        tasks.insert(key, Arc::clone(&handle));
        Ok(TaskRegistration {
            table: Arc::clone(self),
            handle,
        })
    }

    pub fn get(&self, key: &TaskKey) -> Option<Arc<TaskHandle>> {
        self.tasks.lock().unwrap().get(key).cloned()
    }

    /// Cancels and unregisters one task. Returns whether it was found.
    pub fn cancel(&self, key: &TaskKey, keep_files: bool) -> bool {
        let handle = self.tasks.lock().unwrap().remove(key);
        match handle {
            Some(handle) => {
                handle.request_cancel(keep_files);
                true
            }
            None => false,
        }
    }

    /// Cancels and unregisters every task. Returns how many there were.
    pub fn cancel_all(&self, keep_files: bool) -> usize {
        let drained: Vec<_> = self.tasks.lock().unwrap().drain().map(|(_, h)| h).collect();
        for handle in &drained {
            handle.request_cancel(keep_files);
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_if_same(&self, handle: &Arc<TaskHandle>) {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks
            .get(handle.key())
            .is_some_and(|current| Arc::ptr_eq(current, handle))
        {
            tasks.remove(handle.key());
        }
    }
}

/// Keeps a task registered; unregisters it on drop unless a cancel already did.
pub struct TaskRegistration {
    table: Arc<TaskTable>,
    handle: Arc<TaskHandle>,
}

impl TaskRegistration {
    pub fn handle(&self) -> &Arc<TaskHandle> {
        &self.handle
    }
}

impl Drop for TaskRegistration {
    fn drop(&mut self) {
        self.table.remove_if_same(&self.handle);
    }
}

/// One copy in flight, owned by the call executing it.
pub struct TransferTask {
    pub src_uri: String,
    pub dst_uri: String,
    pub src_path: PathBuf,
    pub dst_path: PathBuf,
    pub src_is_file: bool,
    pub watcher: ProgressWatcher,
    pub remote: Option<Arc<RemoteSession>>,
    registration: TaskRegistration,
}

impl TransferTask {
    pub fn new(
        registration: TaskRegistration,
        src_path: PathBuf,
        dst_path: PathBuf,
        src_is_file: bool,
        watcher: ProgressWatcher,
    ) -> Self {
        let key = registration.handle().key().clone();
        Self {
            src_uri: key.src_uri,
            dst_uri: key.dst_uri,
            src_path,
            dst_path,
            src_is_file,
            watcher,
            remote: None,
            registration,
        }
    }

    pub fn handle(&self) -> &Arc<TaskHandle> {
        self.registration.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingRemote(std::sync::atomic::AtomicUsize);

    impl RemoteCancel for CountingRemote {
        fn cancel(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn registration_is_removed_on_drop() {
        let table = TaskTable::new();
        let reg = table.register(TaskKey::new("a", "b"), 0).unwrap();
        assert_eq!(table.len(), 1);
        drop(reg);
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_pair_is_refused() {
        let table = TaskTable::new();
        let _reg = table.register(TaskKey::new("a", "b"), 0).unwrap();
        assert!(matches!(
            table.register(TaskKey::new("a", "b"), 0),
            Err(TransferError::InvalidArgument(_))
        ));
        assert!(table.register(TaskKey::new("a", "c"), 0).is_ok());
    }

    #[test]
    fn cancel_flags_and_unregisters() {
        let table = TaskTable::new();
        let reg = table.register(TaskKey::new("a", "b"), 0).unwrap();
        assert!(table.cancel(&TaskKey::new("a", "b"), false));
        assert!(reg.handle().is_cancelled());
        assert!(!reg.handle().keep_files());
        assert!(table.is_empty());
    }

    #[test]
    fn cancel_of_unknown_pair_is_a_no_op() {
        let table = TaskTable::new();
        assert!(!table.cancel(&TaskKey::new("x", "y"), true));
    }

    #[test]
    fn late_drop_does_not_remove_a_newer_task() {
        let table = TaskTable::new();
        let old = table.register(TaskKey::new("a", "b"), 0).unwrap();
        table.cancel(&TaskKey::new("a", "b"), true);
        let newer = table.register(TaskKey::new("a", "b"), 0).unwrap();
        drop(old);
        assert_eq!(table.len(), 1);
        assert!(Arc::ptr_eq(
            &table.get(&TaskKey::new("a", "b")).unwrap(),
            newer.handle()
        ));
    }

    #[test]
    fn cancel_all_reaches_every_task_and_remote() {
        let table = TaskTable::new();
        let a = table.register(TaskKey::new("a", "1"), 0).unwrap();
        let b = table.register(TaskKey::new("b", "2"), 0).unwrap();

        let remote = Arc::new(CountingRemote(Default::default()));
        let weak: Weak<dyn RemoteCancel> = Arc::downgrade(&remote) as Weak<dyn RemoteCancel>;
        b.handle().attach_remote(weak);

        assert_eq!(table.cancel_all(true), 2);
        assert!(a.handle().is_cancelled());
        assert!(b.handle().is_cancelled());
        assert_eq!(remote.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_remote_is_skipped() {
        let table = TaskTable::new();
        let reg = table.register(TaskKey::new("a", "b"), 0).unwrap();
        let remote = Arc::new(CountingRemote(Default::default()));
        reg.handle()
            .attach_remote(Arc::downgrade(&remote) as Weak<dyn RemoteCancel>);
        drop(remote);
        reg.handle().request_cancel(true);
        assert!(reg.handle().is_cancelled());
    }
}
