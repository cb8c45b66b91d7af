//! Service object wiring every data-plane component of one device.

use std::sync::Arc;

use dfs_asset::{
    AssetError, AssetProtocol, AssetRecvCallback, AssetSendCallback, AssetTransport,
    ProtocolConfig, TrustedDevices,
};
use dfs_file_ops::{PathResolver, SandboxLayout};
use dfs_protocol::AssetObj;
use dfs_transfer::{
    CopyManager, DaemonProxy, MediaProvider, ProgressCallback, RemoteCopyManager, SessionListener,
    TransferError,
};

use crate::config::Config;

/// Optional collaborators of a [`DistributedFileService`].
#[derive(Default)]
pub struct Peers {
    /// Daemon of the device remote sources live on.
    pub daemon: Option<Arc<dyn DaemonProxy>>,
    /// Opens `media` URIs.
    pub media: Option<Arc<dyn MediaProvider>>,
}

/// Owns the task table, the callback registry, the executor and the
/// transport handles of one device.
pub struct DistributedFileService {
    config: Config,
    copies: RemoteCopyManager,
    assets: AssetProtocol,
}

impl DistributedFileService {
    /// Builds the service. Must be called within a tokio runtime.
    pub fn start(
        config: Config,
        transport: Arc<dyn AssetTransport>,
        trust: Arc<dyn TrustedDevices>,
        peers: Peers,
    ) -> Result<Self, AssetError> {
        let resolver = PathResolver::new(
            Arc::new(SandboxLayout::new(&config.sandbox_root)),
            config.user_id,
        );

        let mut copies = CopyManager::new(resolver.clone(), &config.distributed_root);
        if let Some(daemon) = peers.daemon {
            copies = copies.with_daemon(daemon);
        }
        if let Some(media) = peers.media {
            copies = copies.with_media(media);
        }
        let copies = RemoteCopyManager::new(copies, &config.hmdfs_root);

        let assets = AssetProtocol::start(
            ProtocolConfig {
                local_network_id: config.network_id.clone(),
                recv_root: config.recv_root(),
                max_connections: config.max_connections,
            },
            resolver,
            transport,
            trust,
        )?;

        tracing::info!(
            device = %config.device_name,
            network_id = %config.network_id,
            user_id = config.user_id,
            "distributed file service started"
        );
        Ok(Self {
            config,
            copies,
            assets,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Copies `src_uri` to `dst_uri`, blocking until it completes.
    pub fn copy(
        &self,
        src_uri: &str,
        dst_uri: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<(), TransferError> {
        self.copies.copies().copy(src_uri, dst_uri, on_progress)
    }

    pub fn cancel(&self, src_uri: &str, dst_uri: &str, keep_files: bool) -> Result<(), TransferError> {
        self.copies.copies().cancel(src_uri, dst_uri, keep_files)
    }

    pub fn cancel_all(&self, keep_files: bool) -> Result<(), TransferError> {
        self.copies.copies().cancel_all(keep_files)
    }

    /// Serves a peer's copy request; blocks until it completes.
    pub fn remote_copy(
        &self,
        src_uri: &str,
        dst_uri: &str,
        listener: Arc<dyn SessionListener>,
        staging_subpath: &str,
        caller_uid: u32,
    ) -> Result<(), TransferError> {
        self.copies.remote_copy(
            src_uri,
            dst_uri,
            listener,
            self.config.user_id,
            staging_subpath,
            caller_uid,
        )
    }

    pub fn remote_cancel(
        &self,
        src_uri: &str,
        dst_uri: &str,
        caller_uid: u32,
    ) -> Result<(), TransferError> {
        self.copies.remote_cancel(src_uri, dst_uri, caller_uid)
    }

    pub fn push_asset(
        &self,
        asset: AssetObj,
        callback: Arc<dyn AssetSendCallback>,
    ) -> Result<(), AssetError> {
        self.assets.push_asset(self.config.user_id, asset, callback)
    }

    pub fn register_asset_callback(&self, callback: Arc<dyn AssetRecvCallback>) -> bool {
        self.assets.register_callback(callback)
    }

    pub fn unregister_asset_callback(&self, callback: &Arc<dyn AssetRecvCallback>) -> bool {
        self.assets.unregister_callback(callback)
    }

    /// Cancels running copies and stops the asset executor.
    pub async fn shutdown(&self) {
        if let Err(e) = self.cancel_all(true) {
            tracing::warn!(error = %e, "failed to cancel copies on shutdown");
        }
        self.assets.shutdown().await;
        tracing::info!("distributed file service stopped");
    }
}
