use std::path::PathBuf;
use std::sync::Arc;

use crate::AssetError;

/// Transport-assigned socket handle.
pub type SocketId = i32;

/// Transport events for one side of a socket.
///
/// Invoked on threads owned by the transport.
pub trait AssetListener: Send + Sync {
    /// A peer opened a socket towards this device.
    fn on_bind(&self, _socket: SocketId, _peer_network_id: &str) {}

    /// The first files of a transfer arrived.
    fn on_recv_started(&self, _socket: SocketId, _files: &[String]) {}

    fn on_progress(&self, _socket: SocketId, _processed: u64, _total: u64) {}

    /// Every file of the transfer was delivered.
    fn on_finished(&self, socket: SocketId, files: &[String]);

    fn on_error(&self, socket: SocketId, code: i32);

    /// The socket closed, possibly before completion.
    fn on_shutdown(&self, socket: SocketId);
}

/// Reliable, ordered, file-capable device-to-device transport.
pub trait AssetTransport: Send + Sync {
    /// Accepts incoming asset sockets, reporting them to `listener`.
    fn listen(&self, listener: Arc<dyn AssetListener>) -> Result<(), AssetError>;

    /// Opens a socket to the asset endpoint of `peer_network_id`.
    fn bind(
        &self,
        peer_network_id: &str,
        listener: Arc<dyn AssetListener>,
    ) -> Result<SocketId, AssetError>;

    /// Sends `(local source, remote destination name)` pairs.
    fn send_files(&self, socket: SocketId, files: &[(PathBuf, String)]) -> Result<(), AssetError>;

    fn shutdown(&self, socket: SocketId);
}
