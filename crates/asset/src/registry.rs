use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dfs_protocol::{AssetObj, ResultCode};

/// Subscriber to incoming assets.
pub trait AssetRecvCallback: Send + Sync {
    fn on_start(
        &self,
        src_network_id: &str,
        dst_network_id: &str,
        session_id: &str,
        dst_bundle_name: &str,
    );

    fn on_finished(&self, src_network_id: &str, asset: &AssetObj, result: ResultCode);
}

/// Single-use listener for the outcome of one push.
pub trait AssetSendCallback: Send + Sync {
    fn on_send_result(&self, asset: &AssetObj, result: ResultCode);
}

/// Receive subscribers and per-task send listeners.
///
/// Each container has its own lock, and callbacks are invoked on a snapshot
/// taken outside of it.
#[derive(Default)]
pub struct CallbackRegistry {
    recv: Mutex<Vec<Arc<dyn AssetRecvCallback>>>,
    send: Mutex<HashMap<String, Arc<dyn AssetSendCallback>>>,
}

fn same_listener<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl CallbackRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribes `listener`. Returns `false` if it was already subscribed.
    pub fn add_recv(&self, listener: Arc<dyn AssetRecvCallback>) -> bool {
        let mut recv = self.recv.lock().unwrap();
        if recv.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        recv.push(listener);
        true
    }

    /// Unsubscribes `listener`. Returns `false` if it was not subscribed.
    pub fn remove_recv(&self, listener: &Arc<dyn AssetRecvCallback>) -> bool {
        let mut recv = self.recv.lock().unwrap();
        let before = recv.len();
        recv.retain(|l| !same_listener(l, listener));
        recv.len() != before
    }

    pub fn recv_count(&self) -> usize {
        self.recv.lock().unwrap().len()
    }

    pub fn notify_recv_start(
        &self,
        src_network_id: &str,
        dst_network_id: &str,
        session_id: &str,
        dst_bundle_name: &str,
    ) {
        for listener in self.recv_snapshot() {
            listener.on_start(src_network_id, dst_network_id, session_id, dst_bundle_name);
        }
    }

    pub fn notify_recv_finished(&self, src_network_id: &str, asset: &AssetObj, result: ResultCode) {
        for listener in self.recv_snapshot() {
            listener.on_finished(src_network_id, asset, result);
        }
    }

    /// Registers the listener of `task_id`. The first registration wins; an
    /// empty id is refused.
    pub fn add_send(&self, task_id: &str, listener: Arc<dyn AssetSendCallback>) -> bool {
        if task_id.is_empty() {
            tracing::warn!("refusing send callback with empty task id");
            return false;
        }
        let mut send = self.send.lock().unwrap();
        if send.contains_key(task_id) {
            tracing::warn!(task_id, "send callback already registered");
            return false;
        }
        send.insert(task_id.to_string(), listener);
        true
    }

    pub fn remove_send(&self, task_id: &str) -> Option<Arc<dyn AssetSendCallback>> {
        self.send.lock().unwrap().remove(task_id)
    }

    pub fn has_send(&self, task_id: &str) -> bool {
        self.send.lock().unwrap().contains_key(task_id)
    }

    /// Invokes the listener of `task_id` and keeps it registered.
    /// Returns whether one was found.
    pub fn notify_send(&self, task_id: &str, asset: &AssetObj, result: ResultCode) -> bool {
        let listener = self.send.lock().unwrap().get(task_id).cloned();
        match listener {
            Some(listener) => {
                listener.on_send_result(asset, result);
                true
            }
            None => {
                tracing::debug!(task_id, "no send callback to notify");
                false
            }
        }
    }

    /// Removes the listener of `task_id`, then delivers the terminal result
    /// to it. A second completion of the same task finds nothing.
    pub fn complete_send(&self, task_id: &str, asset: &AssetObj, result: ResultCode) -> bool {
        match self.remove_send(task_id) {
            Some(listener) => {
                listener.on_send_result(asset, result);
                true
            }
            None => {
                tracing::debug!(task_id, "send already completed");
                false
            }
        }
    }

    fn recv_snapshot(&self) -> Vec<Arc<dyn AssetRecvCallback>> {
        self.recv.lock().unwrap().clone()
    }
}
