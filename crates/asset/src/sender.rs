use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dfs_file_ops::PathResolver;
use dfs_protocol::constants::FILE_SCHEME;
use dfs_protocol::{AssetObj, ResultCode, WireName};

use crate::{
    AssetError, AssetListener, AssetTransport, Bundle, CallbackRegistry, ConnectionLimiter,
    SocketId, TrustedDevices, pack,
};

/// A push waiting for its transport outcome.
struct PendingSend {
    asset: AssetObj,
    /// Keeps a temporary zip alive until the transport is done with it.
    bundle: Bundle,
}

struct Prepared {
    bundle: Bundle,
    wire_name: String,
}

/// Sending half of the asset protocol.
pub struct AssetSender {
    transport: Arc<dyn AssetTransport>,
    registry: Arc<CallbackRegistry>,
    trust: Arc<dyn TrustedDevices>,
    limiter: ConnectionLimiter,
    resolver: PathResolver,
    sessions: Mutex<HashMap<SocketId, PendingSend>>,
}

impl AssetSender {
    pub fn new(
        transport: Arc<dyn AssetTransport>,
        registry: Arc<CallbackRegistry>,
        trust: Arc<dyn TrustedDevices>,
        limiter: ConnectionLimiter,
        resolver: PathResolver,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            registry,
            trust,
            limiter,
            resolver,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Number of sockets still waiting for a transport outcome.
    pub fn pending(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Bundles and sends `asset` for `user_id`.
    ///
    /// The send callback of the asset's task must already be registered. Any
    /// failure completes it with [`ResultCode::EventHandler`].
    pub async fn push(self: Arc<Self>, user_id: u32, asset: AssetObj) -> Result<(), AssetError> {
        let result = self.send(user_id, &asset).await;
        if let Err(e) = &result {
            tracing::error!(task_id = %asset.task_id(), error = %e, "asset push failed");
            self.registry
                .complete_send(&asset.task_id(), &asset, ResultCode::EventHandler);
        }
        result
    }

    async fn send(self: &Arc<Self>, user_id: u32, asset: &AssetObj) -> Result<(), AssetError> {
        check_asset(asset)?;

        let prepared = tokio::task::spawn_blocking({
            let resolver = self.resolver.for_user(user_id);
            let asset = asset.clone();
            move || prepare(&resolver, &asset)
        })
        .await??;

        if !self.trust.is_same_account(&asset.dst_network_id) {
            return Err(AssetError::PermissionDenied(format!(
                "{} is not on this account",
                asset.dst_network_id
            )));
        }

        let socket = {
            let _permit = self.limiter.acquire().await?;
            tokio::task::spawn_blocking({
                let transport = Arc::clone(&self.transport);
                let peer = asset.dst_network_id.clone();
                let listener: Arc<dyn AssetListener> = self.clone();
                move || transport.bind(&peer, listener)
            })
            .await??
        };
        tracing::info!(socket, peer = %asset.dst_network_id, "bound asset socket");

        let files = vec![(prepared.bundle.path().to_path_buf(), prepared.wire_name)];
        self.sessions.lock().unwrap().insert(
            socket,
            PendingSend {
                asset: asset.clone(),
                bundle: prepared.bundle,
            },
        );

        let sent = tokio::task::spawn_blocking({
            let transport = Arc::clone(&self.transport);
            move || transport.send_files(socket, &files)
        })
        .await?;
        if let Err(e) = sent {
            self.sessions.lock().unwrap().remove(&socket);
            self.transport.shutdown(socket);
            return Err(e);
        }
        Ok(())
    }

    fn finish(&self, socket: SocketId, result: ResultCode) {
        let Some(pending) = self.sessions.lock().unwrap().remove(&socket) else {
            return;
        };
        let PendingSend { asset, bundle } = pending;
        drop(bundle);
        tracing::info!(socket, task_id = %asset.task_id(), ?result, "asset push finished");
        self.registry.complete_send(&asset.task_id(), &asset, result);
        self.transport.shutdown(socket);
    }
}

impl AssetListener for AssetSender {
    fn on_finished(&self, socket: SocketId, _files: &[String]) {
        self.finish(socket, ResultCode::Ok);
    }

    fn on_error(&self, socket: SocketId, code: i32) {
        tracing::warn!(socket, code, "asset send failed");
        self.finish(socket, ResultCode::Transport);
    }

    fn on_shutdown(&self, socket: SocketId) {
        self.finish(socket, ResultCode::Transport);
    }
}

fn check_asset(asset: &AssetObj) -> Result<(), AssetError> {
    let fields = [
        ("sessionId", &asset.session_id),
        ("dstNetworkId", &asset.dst_network_id),
        ("srcBundleName", &asset.src_bundle_name),
        ("dstBundleName", &asset.dst_bundle_name),
    ];
    for (name, value) in fields {
        if value.is_empty() {
            return Err(AssetError::InvalidArgument(format!("{name} is empty")));
        }
    }
    if asset.uris.is_empty() {
        return Err(AssetError::InvalidArgument("no uris to push".into()));
    }
    Ok(())
}

/// Resolves the asset's files and builds its bundle and wire name.
fn prepare(resolver: &PathResolver, asset: &AssetObj) -> Result<Prepared, AssetError> {
    let mut files = Vec::with_capacity(asset.uris.len());
    for uri in &asset.uris {
        let path = resolver.resolve(uri, true)?;
        if path.is_dir() {
            return Err(AssetError::InvalidArgument(format!(
                "folders cannot be pushed: {uri}"
            )));
        }
        files.push(path);
    }

    let root = bundle_root(resolver, &files, &asset.src_bundle_name).ok_or_else(|| {
        AssetError::InvalidArgument(format!(
            "{} is not inside bundle {}",
            files[0].display(),
            asset.src_bundle_name
        ))
    })?;
    let bundle = pack(&root, &files)?;

    let wire_name = WireName::for_send(
        bundle.path(),
        &root,
        &asset.src_bundle_name,
        &asset.dst_bundle_name,
        &asset.session_id,
        bundle.kind(),
    )?
    .encode()?;
    Ok(Prepared { bundle, wire_name })
}

/// Directory every file of the asset is relative to.
///
/// The resolver's mapping of `file://<bundle>/` when it encloses all
/// `files`, else the outermost ancestor of the first file named `bundle`.
fn bundle_root(resolver: &PathResolver, files: &[PathBuf], bundle: &str) -> Option<PathBuf> {
    let mapped = resolver
        .resolve(&format!("{FILE_SCHEME}{bundle}/"), false)
        .ok()
        .filter(|root| files.iter().all(|f| f.starts_with(root)));
    mapped.or_else(|| {
        files.first()?
            .ancestors()
            .filter(|a| a.file_name().is_some_and(|n| n == bundle))
            .last()
            .map(Path::to_path_buf)
    })
}
