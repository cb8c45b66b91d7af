//! In-process transport between simulated devices.
//!
//! Every device registers on a shared [`LoopbackNetwork`] with its receive
//! root. Sending copies each file to `<peer recv root>/<destination name>`
//! on a background thread and then fires the same callbacks a real
//! transport would.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dfs_file_ops::ensure_parent;

use crate::{AssetError, AssetListener, AssetTransport, SocketId};

struct Link {
    peer: Arc<LoopbackTransport>,
    sender: Arc<dyn AssetListener>,
}

/// Registry of simulated devices.
#[derive(Default)]
pub struct LoopbackNetwork {
    devices: Mutex<HashMap<String, Weak<LoopbackTransport>>>,
    next_socket: AtomicI32,
}

impl LoopbackNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds a device reachable as `network_id`, receiving under `recv_root`.
    pub fn join(
        self: &Arc<Self>,
        network_id: impl Into<String>,
        recv_root: impl Into<PathBuf>,
    ) -> Arc<LoopbackTransport> {
        let network_id = network_id.into();
        let transport = Arc::new(LoopbackTransport {
            network: Arc::clone(self),
            network_id: network_id.clone(),
            recv_root: recv_root.into(),
            listener: Mutex::new(None),
            links: Mutex::new(HashMap::new()),
        });
        self.devices
            .lock()
            .unwrap()
            .insert(network_id, Arc::downgrade(&transport));
        transport
    }

    fn device(&self, network_id: &str) -> Option<Arc<LoopbackTransport>> {
        self.devices
            .lock()
            .unwrap()
            .get(network_id)
            .and_then(Weak::upgrade)
    }
}

/// One device's end of a [`LoopbackNetwork`].
pub struct LoopbackTransport {
    network: Arc<LoopbackNetwork>,
    network_id: String,
    recv_root: PathBuf,
    listener: Mutex<Option<Arc<dyn AssetListener>>>,
    links: Mutex<HashMap<SocketId, Link>>,
}

impl LoopbackTransport {
    pub fn network_id(&self) -> &str {
        &self.network_id
    }

    fn receiver(&self) -> Option<Arc<dyn AssetListener>> {
        self.listener.lock().unwrap().clone()
    }
}

impl AssetTransport for LoopbackTransport {
    fn listen(&self, listener: Arc<dyn AssetListener>) -> Result<(), AssetError> {
        *self.listener.lock().unwrap() = Some(listener);
        Ok(())
    }

    fn bind(
        &self,
        peer_network_id: &str,
        listener: Arc<dyn AssetListener>,
    ) -> Result<SocketId, AssetError> {
        let peer = self
            .network
            .device(peer_network_id)
            .ok_or_else(|| AssetError::Transport(format!("unknown peer {peer_network_id}")))?;
        let receiver = peer
            .receiver()
            .ok_or_else(|| AssetError::Transport(format!("{peer_network_id} is not listening")))?;

        let socket = self.network.next_socket.fetch_add(1, Ordering::SeqCst) + 1;
        self.links.lock().unwrap().insert(
            socket,
            Link {
                peer,
                sender: listener,
            },
        );
        receiver.on_bind(socket, &self.network_id);
        Ok(socket)
    }

    fn send_files(&self, socket: SocketId, files: &[(PathBuf, String)]) -> Result<(), AssetError> {
        let (peer, sender) = {
            let links = self.links.lock().unwrap();
            let link = links
                .get(&socket)
                .ok_or_else(|| AssetError::Transport(format!("socket {socket} is closed")))?;
            (Arc::clone(&link.peer), Arc::clone(&link.sender))
        };
        let receiver = peer
            .receiver()
            .ok_or_else(|| AssetError::Transport("peer stopped listening".into()))?;
        let files = files.to_vec();

        std::thread::Builder::new()
            .name("loopback-send".into())
            .spawn(move || deliver(socket, &peer.recv_root, &files, &*sender, &*receiver))?;
        Ok(())
    }

    fn shutdown(&self, socket: SocketId) {
        let Some(link) = self.links.lock().unwrap().remove(&socket) else {
            return;
        };
        if let Some(receiver) = link.peer.receiver() {
            receiver.on_shutdown(socket);
        }
    }
}

fn deliver(
    socket: SocketId,
    recv_root: &std::path::Path,
    files: &[(PathBuf, String)],
    sender: &dyn AssetListener,
    receiver: &dyn AssetListener,
) {
    let mut received = Vec::with_capacity(files.len());
    let mut sent = Vec::with_capacity(files.len());
    let total: u64 = files
        .iter()
        .filter_map(|(src, _)| std::fs::metadata(src).ok())
        .map(|m| m.len())
        .sum();
    let mut processed = 0u64;

    for (src, name) in files {
        let target = recv_root.join(name);
        let copied = ensure_parent(&target)
            .map_err(std::io::Error::other)
            .and_then(|()| std::fs::copy(src, &target));
        match copied {
            Ok(bytes) => {
                processed += bytes;
                received.push(target.to_string_lossy().into_owned());
                sent.push(src.to_string_lossy().into_owned());
                if received.len() == 1 {
                    receiver.on_recv_started(socket, &received);
                }
                sender.on_progress(socket, processed, total);
                receiver.on_progress(socket, processed, total);
            }
            Err(e) => {
                tracing::warn!(socket, file = %src.display(), error = %e, "loopback delivery failed");
                let code = e.raw_os_error().unwrap_or(libc::EIO);
                receiver.on_error(socket, code);
                sender.on_error(socket, code);
                return;
            }
        }
    }

    receiver.on_finished(socket, &received);
    sender.on_finished(socket, &sent);
}
