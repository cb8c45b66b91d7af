use std::path::PathBuf;
use std::sync::Arc;

use dfs_file_ops::PathResolver;
use dfs_protocol::constants::MAX_CONCURRENT_CONNECTIONS;
use dfs_protocol::{AssetObj, ResultCode};

use crate::{
    AssetError, AssetReceiver, AssetRecvCallback, AssetSendCallback, AssetSender, AssetTransport,
    CallbackRegistry, ConnectionLimiter, Job, TransferExecutor, TrustedDevices,
};

/// Settings of one device's asset endpoint.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Network id peers use to reach this device.
    pub local_network_id: String,
    /// Directory under which incoming files are delivered.
    pub recv_root: PathBuf,
    /// Connection-open requests allowed in flight.
    pub max_connections: usize,
}

impl ProtocolConfig {
    pub fn new(local_network_id: impl Into<String>, recv_root: impl Into<PathBuf>) -> Self {
        Self {
            local_network_id: local_network_id.into(),
            recv_root: recv_root.into(),
            max_connections: MAX_CONCURRENT_CONNECTIONS,
        }
    }
}

/// Both halves of the asset protocol behind one handle.
pub struct AssetProtocol {
    registry: Arc<CallbackRegistry>,
    sender: Arc<AssetSender>,
    receiver: Arc<AssetReceiver>,
    executor: TransferExecutor,
}

impl AssetProtocol {
    /// Starts listening on `transport`. Must be called within a tokio runtime.
    pub fn start(
        config: ProtocolConfig,
        resolver: PathResolver,
        transport: Arc<dyn AssetTransport>,
        trust: Arc<dyn TrustedDevices>,
    ) -> Result<Self, AssetError> {
        let registry = CallbackRegistry::new();
        let receiver = AssetReceiver::new(
            Arc::clone(&registry),
            Arc::clone(&trust),
            config.recv_root,
            config.local_network_id,
        );
        transport.listen(receiver.clone())?;

        let sender = AssetSender::new(
            transport,
            Arc::clone(&registry),
            trust,
            ConnectionLimiter::new(config.max_connections),
            resolver,
        );
        Ok(Self {
            registry,
            sender,
            receiver,
            executor: TransferExecutor::start(),
        })
    }

    /// Queues a push of `asset` on behalf of `user_id`.
    ///
    /// `callback` hears the outcome exactly once. A task id that is already
    /// in flight is refused and `callback` is not registered.
    pub fn push_asset(
        &self,
        user_id: u32,
        asset: AssetObj,
        callback: Arc<dyn AssetSendCallback>,
    ) -> Result<(), AssetError> {
        let task_id = asset.task_id();
        if asset.session_id.is_empty() || !self.registry.add_send(&task_id, callback) {
            return Err(AssetError::InvalidArgument(format!(
                "cannot register push {task_id}"
            )));
        }
        tracing::info!(task_id, files = asset.uris.len(), "queued asset push");

        let registry = Arc::clone(&self.registry);
        let abandoned = asset.clone();
        let sender = Arc::clone(&self.sender);
        let job = Job::new(async move {
            let _ = sender.push(user_id, asset).await;
        })
        .on_abandon(move || {
            registry.complete_send(&abandoned.task_id(), &abandoned, ResultCode::Cancelled);
        });
        self.executor.submit(job)
    }

    pub fn register_callback(&self, callback: Arc<dyn AssetRecvCallback>) -> bool {
        self.registry.add_recv(callback)
    }

    pub fn unregister_callback(&self, callback: &Arc<dyn AssetRecvCallback>) -> bool {
        self.registry.remove_recv(callback)
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    pub fn sender(&self) -> &Arc<AssetSender> {
        &self.sender
    }

    pub fn receiver(&self) -> &Arc<AssetReceiver> {
        &self.receiver
    }

    pub async fn shutdown(&self) {
        self.executor.shutdown().await;
    }
}
