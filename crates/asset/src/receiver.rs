use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dfs_file_ops::{ensure_parent, is_path_valid, remove_tree, validate_relative_path};
use dfs_protocol::codec::{receive_uri, strip_marker, temp_dir_of};
use dfs_protocol::{AssetObj, BundleKind, ResultCode, WireName};

use crate::{AssetError, AssetListener, CallbackRegistry, SocketId, TrustedDevices, unpack};

struct RecvSession {
    peer: String,
    asset: Option<AssetObj>,
}

/// Receiving half of the asset protocol.
///
/// Files arrive under `recv_root` as `<dstBundle>/ASSET_TEMP/<name><marker>...`
/// and are moved to `<recv_root>/<dstBundle>/<relative path>`.
pub struct AssetReceiver {
    registry: Arc<CallbackRegistry>,
    trust: Arc<dyn TrustedDevices>,
    recv_root: PathBuf,
    local_network_id: String,
    sessions: Mutex<HashMap<SocketId, RecvSession>>,
}

impl AssetReceiver {
    pub fn new(
        registry: Arc<CallbackRegistry>,
        trust: Arc<dyn TrustedDevices>,
        recv_root: impl Into<PathBuf>,
        local_network_id: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            trust,
            recv_root: recv_root.into(),
            local_network_id: local_network_id.into(),
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn recv_root(&self) -> &Path {
        &self.recv_root
    }

    /// Number of sockets bound to this receiver and not yet resolved.
    pub fn active(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn start_asset(&self, files: &[String]) -> Option<AssetObj> {
        let first = files.first()?;
        match WireName::decode(first) {
            Ok(name) => Some(AssetObj {
                session_id: name.session_id,
                dst_network_id: self.local_network_id.clone(),
                src_bundle_name: name.src_bundle_name,
                dst_bundle_name: name.dst_bundle_name,
                uris: Vec::new(),
            }),
            Err(e) => {
                tracing::warn!(file = %first, error = %e, "undecodable asset name");
                None
            }
        }
    }

    /// Moves every received file into place, appending result URIs to `asset`.
    fn materialize(&self, asset: &mut AssetObj, files: &[String]) -> Result<(), AssetError> {
        for file in files {
            if !is_path_valid(file) {
                return Err(AssetError::IllegalPath(file.clone()));
            }
            let name = WireName::decode(file)?;
            validate_relative_path(&name.relative_path)?;
            let (stripped, kind) = strip_marker(file)
                .ok_or_else(|| AssetError::InvalidArgument(format!("no marker: {file}")))?;
            std::fs::rename(file, stripped)?;

            match kind {
                BundleKind::Single => {
                    self.place(&name.dst_bundle_name, &name.relative_path, Path::new(stripped))?;
                    asset
                        .uris
                        .push(receive_uri(&name.dst_bundle_name, &name.relative_path));
                }
                BundleKind::Zip => {
                    let temp_dir = self.recv_root.join(name.temp_dir());
                    let extracted = unpack(Path::new(stripped), &temp_dir);
                    if extracted.is_empty() {
                        return Err(AssetError::InvalidArgument(format!(
                            "empty or unreadable bundle {stripped}"
                        )));
                    }
                    for path in extracted {
                        let rel = path
                            .strip_prefix(&temp_dir)
                            .map_err(|_| AssetError::IllegalPath(path.display().to_string()))?
                            .to_string_lossy()
                            .replace('\\', "/");
                        validate_relative_path(&rel)?;
                        self.place(&name.dst_bundle_name, &rel, &path)?;
                        asset.uris.push(receive_uri(&name.dst_bundle_name, &rel));
                    }
                }
            }
        }
        Ok(())
    }

    fn place(&self, dst_bundle: &str, rel: &str, from: &Path) -> Result<(), AssetError> {
        let to = self.recv_root.join(dst_bundle).join(rel);
        ensure_parent(&to)?;
        std::fs::rename(from, &to)?;
        tracing::debug!(to = %to.display(), "placed received file");
        Ok(())
    }

    /// Removes the `ASSET_TEMP` directory of every bundle touched by `files`.
    fn remove_temp_dirs(&self, asset: &AssetObj, files: &[String]) {
        let mut bundles: BTreeSet<String> = files
            .iter()
            .filter_map(|f| WireName::decode(f).ok())
            .map(|name| name.dst_bundle_name)
            .collect();
        if !asset.dst_bundle_name.is_empty() {
            bundles.insert(asset.dst_bundle_name.clone());
        }
        for bundle in bundles {
            let path = self.recv_root.join(temp_dir_of(&bundle));
            if let Err(e) = remove_tree(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove asset temp dir");
            }
        }
    }

    fn abort(&self, socket: SocketId, reason: &str) {
        let Some(session) = self.sessions.lock().unwrap().remove(&socket) else {
            return;
        };
        tracing::warn!(socket, peer = %session.peer, reason, "asset receive aborted");
        let asset = session.asset.unwrap_or_default();
        self.remove_temp_dirs(&asset, &[]);
        self.registry
            .notify_recv_finished(&session.peer, &asset, ResultCode::BadValue);
    }
}

impl AssetListener for AssetReceiver {
    fn on_bind(&self, socket: SocketId, peer_network_id: &str) {
        if !self.trust.is_same_account(peer_network_id) {
            tracing::warn!(socket, peer = peer_network_id, "ignoring asset socket from untrusted peer");
            return;
        }
        self.sessions.lock().unwrap().insert(
            socket,
            RecvSession {
                peer: peer_network_id.to_string(),
                asset: None,
            },
        );
    }

    fn on_recv_started(&self, socket: SocketId, files: &[String]) {
        let asset = self.start_asset(files);
        let peer = {
            let mut sessions = self.sessions.lock().unwrap();
            let Some(session) = sessions.get_mut(&socket) else {
                tracing::warn!(socket, "files on an unknown asset socket");
                return;
            };
            if session.asset.is_some() {
                return;
            }
            session.asset = asset.clone();
            session.peer.clone()
        };
        if let Some(asset) = asset {
            tracing::info!(socket, session_id = %asset.session_id, "asset receive started");
            self.registry.notify_recv_start(
                &peer,
                &asset.dst_network_id,
                &asset.session_id,
                &asset.dst_bundle_name,
            );
        }
    }

    fn on_finished(&self, socket: SocketId, files: &[String]) {
        let Some(session) = self.sessions.lock().unwrap().remove(&socket) else {
            tracing::warn!(socket, "finish on an unknown asset socket");
            return;
        };
        let mut asset = session
            .asset
            .or_else(|| self.start_asset(files))
            .unwrap_or_default();

        let result = match self.materialize(&mut asset, files) {
            Ok(()) => ResultCode::Ok,
            Err(e) => {
                tracing::warn!(socket, error = %e, "failed to place received asset");
                ResultCode::BadValue
            }
        };
        self.remove_temp_dirs(&asset, files);

        tracing::info!(socket, files = asset.uris.len(), ?result, "asset receive finished");
        self.registry
            .notify_recv_finished(&session.peer, &asset, result);
    }

    fn on_error(&self, socket: SocketId, code: i32) {
        self.abort(socket, &format!("transport error {code}"));
    }

    fn on_shutdown(&self, socket: SocketId) {
        self.abort(socket, "socket shut down");
    }
}
