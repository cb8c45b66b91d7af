fn main() {
    println!("Run `cargo test -p dfs-scenarios` to execute the end-to-end scenarios.");
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use dfs_asset::{
        AssetRecvCallback, AssetSendCallback, AuthForm, LoopbackNetwork, StaticTrustList,
    };
    use dfs_daemon::{Config, DistributedFileService, Peers};
    use dfs_file_ops::{PathResolver, SandboxLayout};
    use dfs_protocol::{AssetObj, ResultCode};
    use dfs_transfer::{
        CopyManager, DaemonProxy, ProgressCallback, RemoteCopyInfo, SessionInfo, SessionListener,
        TransferError,
    };
    use tokio::sync::mpsc;

    fn manager(root: &Path) -> CopyManager {
        let resolver = PathResolver::new(Arc::new(SandboxLayout::new(root.join("sandbox"))), 100);
        CopyManager::new(resolver, root.join("staging"))
    }

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<(u64, u64)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let cb: ProgressCallback = Arc::new(move |p, t| sink.lock().unwrap().push((p, t)));
        (cb, calls)
    }

    /// Every entry below `root`, relative and sorted.
    fn tree(root: &Path) -> Vec<PathBuf> {
        fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                out.push(path.strip_prefix(root).unwrap().to_path_buf());
                if path.is_dir() {
                    walk(&path, root, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(root, root, &mut out);
        out.sort();
        out
    }

    #[test]
    fn copy_onto_itself_is_a_silent_success() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("a/src.txt");
        std::fs::create_dir_all(src.parent().unwrap()).unwrap();
        std::fs::write(&src, b"unchanged").unwrap();
        let before = std::fs::metadata(&src).unwrap().modified().unwrap();
        let listing = tree(tmp.path());

        let uri = format!("file://{}", src.display());
        let (cb, calls) = recorder();
        let mgr = manager(tmp.path());
        mgr.copy(&uri, &uri, Some(cb)).unwrap();

        assert!(calls.lock().unwrap().is_empty());
        assert!(mgr.tasks().is_empty());
        assert_eq!(tree(tmp.path()), listing);
        assert_eq!(std::fs::metadata(&src).unwrap().modified().unwrap(), before);
        assert_eq!(std::fs::read(&src).unwrap(), b"unchanged");
    }

    #[test]
    fn directory_into_its_own_subtree_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let bundle = tmp.path().join("sandbox/100/com.demo");
        std::fs::create_dir_all(bundle.join("d/inner")).unwrap();
        std::fs::write(bundle.join("d/f.txt"), b"f").unwrap();
        let listing = tree(tmp.path());

        let err = manager(tmp.path())
            .copy("file://com.demo/d", "file://com.demo/d/inner", None)
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidArgument(_)));
        assert_eq!(tree(tmp.path()), listing);
    }

    #[test]
    fn cancelling_an_unknown_pair_succeeds() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = manager(tmp.path());
        mgr.cancel("file://com.demo/nothing", "file://com.demo/nowhere", true)
            .unwrap();
        mgr.cancel("file://com.demo/nothing", "file://com.demo/nowhere", false)
            .unwrap();
    }

    struct RefusingDaemon {
        staging_seen: Mutex<Option<PathBuf>>,
    }

    impl DaemonProxy for RefusingDaemon {
        fn prepare_session(
            &self,
            _src_uri: &str,
            _dst_uri: &str,
            _src_device_id: &str,
            _listener: Arc<dyn SessionListener>,
            info: &mut SessionInfo,
        ) -> Result<(), TransferError> {
            if let Some(dir) = &info.staging_dir {
                assert!(dir.is_dir(), "staging dir must exist while the session opens");
            }
            *self.staging_seen.lock().unwrap() = info.staging_dir.clone();
            Err(TransferError::Transport("session refused by peer".into()))
        }

        fn cancel_copy_task(&self, _session_name: &str) -> Result<(), TransferError> {
            Ok(())
        }

        fn request_send_file(
            &self,
            _src_uri: &str,
            _dst_path: &str,
            _dst_device_id: &str,
            _session_name: &str,
        ) -> Result<(), TransferError> {
            Ok(())
        }

        fn get_remote_copy_info(&self, _src_uri: &str) -> Result<RemoteCopyInfo, TransferError> {
            Ok(RemoteCopyInfo {
                is_file: true,
                is_dir: false,
            })
        }
    }

    #[test]
    fn failed_session_open_cleans_staging_and_returns_the_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("sandbox/100/com.demo")).unwrap();
        let daemon = Arc::new(RefusingDaemon {
            staging_seen: Mutex::new(None),
        });
        let mgr = manager(tmp.path()).with_daemon(daemon.clone());

        let err = mgr
            .copy(
                "file://com.demo/remote.txt?networkid=peer-1",
                "file://com.demo/local.txt",
                None,
            )
            .unwrap_err();

        assert_eq!(err.to_string(), "transport error: session refused by peer");
        let staging = daemon.staging_seen.lock().unwrap().clone().unwrap();
        assert!(staging.starts_with(tmp.path().join("staging")));
        assert!(!staging.exists());
        assert!(mgr.tasks().is_empty());
    }

    struct SendProbe(mpsc::UnboundedSender<ResultCode>);

    impl AssetSendCallback for SendProbe {
        fn on_send_result(&self, _asset: &AssetObj, result: ResultCode) {
            let _ = self.0.send(result);
        }
    }

    struct RecvProbe(mpsc::UnboundedSender<(AssetObj, ResultCode)>);

    impl AssetRecvCallback for RecvProbe {
        fn on_start(&self, _: &str, _: &str, _: &str, _: &str) {}
        fn on_finished(&self, _src: &str, asset: &AssetObj, result: ResultCode) {
            let _ = self.0.send((asset.clone(), result));
        }
    }

    fn device(root: &Path, network: &Arc<LoopbackNetwork>, id: &str, peer: &str) -> DistributedFileService {
        let config = Config {
            network_id: id.into(),
            sandbox_root: root.join(id).join("sandbox"),
            distributed_root: root.join(id).join("distributed"),
            hmdfs_root: root.join(id).join("hmdfs"),
            ..Config::default()
        };
        let transport = network.join(id, config.recv_root());
        let trust = Arc::new(StaticTrustList::new());
        trust.insert(peer, AuthForm::IdenticalAccount);
        DistributedFileService::start(config, transport, trust, Peers::default()).unwrap()
    }

    #[tokio::test]
    async fn three_files_pushed_as_one_asset() {
        let tmp = tempfile::tempdir().unwrap();
        let network = LoopbackNetwork::new();
        let phone = device(tmp.path(), &network, "phone", "tablet");
        let tablet = device(tmp.path(), &network, "tablet", "phone");

        let bundle = phone.config().sandbox_root.join("100/com.demo.notes");
        for (rel, data) in [("a.txt", "A"), ("b/b.txt", "BB"), ("c.txt", "CCC")] {
            let path = bundle.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, data).unwrap();
        }

        let (recv_tx, mut recv_rx) = mpsc::unbounded_channel();
        tablet.register_asset_callback(Arc::new(RecvProbe(recv_tx)));
        let (send_tx, mut send_rx) = mpsc::unbounded_channel();

        phone
            .push_asset(
                AssetObj {
                    session_id: "1001".into(),
                    dst_network_id: "tablet".into(),
                    src_bundle_name: "com.demo.notes".into(),
                    dst_bundle_name: "com.demo.viewer".into(),
                    uris: vec![
                        "file://com.demo.notes/a.txt".into(),
                        "file://com.demo.notes/b/b.txt".into(),
                        "file://com.demo.notes/c.txt".into(),
                    ],
                },
                Arc::new(SendProbe(send_tx)),
            )
            .unwrap();

        let wait = Duration::from_secs(10);
        let (asset, result) = tokio::time::timeout(wait, recv_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result, ResultCode::Ok);
        let base = "file://com.demo.viewer/data/storage/el2/distributedfiles";
        assert_eq!(
            asset.uris,
            vec![
                format!("{base}/a.txt"),
                format!("{base}/b/b.txt"),
                format!("{base}/c.txt"),
            ]
        );
        let sent = tokio::time::timeout(wait, send_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sent, ResultCode::Ok);

        let landed = tablet.config().recv_root().join("com.demo.viewer");
        assert_eq!(std::fs::read_to_string(landed.join("a.txt")).unwrap(), "A");
        assert_eq!(std::fs::read_to_string(landed.join("b/b.txt")).unwrap(), "BB");
        assert_eq!(std::fs::read_to_string(landed.join("c.txt")).unwrap(), "CCC");
        assert!(!landed.join("ASSET_TEMP").exists());

        phone.shutdown().await;
        tablet.shutdown().await;
    }

    #[test]
    fn bundle_holds_one_entry_per_file() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("com.demo.notes");
        let mut files = Vec::new();
        for rel in ["a.txt", "b/b.txt", "c.txt"] {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, rel).unwrap();
            files.push(path);
        }

        let bundle = dfs_asset::pack(&root, &files).unwrap();
        let archive = zip::ZipArchive::new(std::fs::File::open(bundle.path()).unwrap()).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b/b.txt", "c.txt"]);

        let out = tmp.path().join("out");
        let extracted = dfs_asset::unpack(bundle.path(), &out);
        assert_eq!(extracted.len(), 3);
        for rel in ["a.txt", "b/b.txt", "c.txt"] {
            assert_eq!(std::fs::read_to_string(out.join(rel)).unwrap(), rel);
        }

        let zip_path = bundle.path().to_path_buf();
        drop(bundle);
        assert!(!zip_path.exists());
    }
}
