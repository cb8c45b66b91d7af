use std::time::Duration;

/// Query parameter appended to a URI whose file lives on another device.
pub const NETWORK_PARA: &str = "?networkid=";

/// URI scheme of every sandbox URI.
pub const FILE_SCHEME: &str = "file://";

/// Authority of media-library URIs (opened through a provider, never by path).
pub const MEDIA_AUTHORITY: &str = "media";

/// Authority of file-manager URIs.
pub const DOCS_AUTHORITY: &str = "docs";

/// Marker placed before the metadata query of a single-file bundle.
pub const ASSET_FLAG_SINGLE: &str = ".asset_single?";

/// Marker placed before the metadata query of a zip bundle.
pub const ASSET_FLAG_ZIP: &str = ".asset_zip?";

/// Per-bundle directory receiving in-flight asset files.
pub const ASSET_TEMP_DIR: &str = "ASSET_TEMP";

/// Infix of the receive tree; the destination bundle name follows it.
pub const RECV_ROOT_INFIX: &str = "account/device_view/local/data/";

/// Infix of the per-bundle data tree seen through the distributed mount.
pub const ACCOUNT_DATA_INFIX: &str = "account/data";

/// Sandbox path under which received assets become visible to applications.
pub const DISTRIBUTED_FILES_PATH: &str = "/data/storage/el2/distributedfiles";

/// Query key carrying the source bundle name.
pub const QUERY_SRC_BUNDLE: &str = "srcBundleName=";

/// Query key carrying the session id.
pub const QUERY_SESSION_ID: &str = "&sessionId=";

/// Upper bound of a single zero-copy transfer call: 4 MiB.
pub const COPY_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Minimum wall-clock spacing between two progress callbacks.
pub const PROGRESS_NOTIFY_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of connection-open requests allowed in flight.
pub const MAX_CONCURRENT_CONNECTIONS: usize = 3;
