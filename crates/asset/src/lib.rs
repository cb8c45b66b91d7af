//! Cross-device asset push.
//!
//! One or many sandbox files travel to a peer as a single bundle: the file
//! itself, or a zip when there is more than one. Session metadata rides in
//! the transport destination filename (see [`dfs_protocol::WireName`]).
//! The [`AssetProtocol`] ties the sending and receiving halves to a
//! [`CallbackRegistry`] and a single-worker [`TransferExecutor`].

mod bundle;
mod executor;
mod handler;
mod limiter;
mod loopback;
mod receiver;
mod registry;
mod sender;
mod transport;
mod trust;

pub use bundle::{Bundle, TempBundle, pack, unpack};
pub use executor::{Job, TransferExecutor};
pub use handler::{AssetProtocol, ProtocolConfig};
pub use limiter::ConnectionLimiter;
pub use loopback::{LoopbackNetwork, LoopbackTransport};
pub use receiver::AssetReceiver;
pub use registry::{AssetRecvCallback, AssetSendCallback, CallbackRegistry};
pub use sender::AssetSender;
pub use transport::{AssetListener, AssetTransport, SocketId};
pub use trust::{AuthForm, StaticTrustList, TrustedDevices};

use dfs_file_ops::FileOpsError;
use dfs_protocol::CodecError;

/// Errors produced by the asset crate.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
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

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("wire name error: {0}")]
    Codec(#[from] CodecError),

    #[error("cancelled")]
    Cancelled,
}

impl From<FileOpsError> for AssetError {
    fn from(err: FileOpsError) -> Self {
        match err {
            FileOpsError::Io(e) => AssetError::Io(e),
            FileOpsError::InvalidUri(msg) | FileOpsError::Ambiguous(msg) => {
                AssetError::InvalidArgument(msg)
            }
            FileOpsError::IllegalPath(msg) => AssetError::IllegalPath(msg),
            FileOpsError::NotFound(msg) => AssetError::NotFound(msg),
        }
    }
}

impl From<tokio::task::JoinError> for AssetError {
    fn from(err: tokio::task::JoinError) -> Self {
        AssetError::Io(std::io::Error::other(format!("task join error: {err}")))
    }
}
