//! Daemon configuration.
//!
//! Stored as TOML, by default at `~/.config/dfs/dfs-daemon.toml`. Every key
//! is optional; missing keys take the defaults below.

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active OS account used for path mapping.
    #[serde(default = "default_user_id")]
    pub user_id: u32,

    /// Local device label in logs (hostname by default).
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Network id advertised to peers.
    #[serde(default = "default_network_id")]
    pub network_id: String,

    /// Root under which `file://<bundle>/...` URIs are mapped.
    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: PathBuf,

    /// Staging root for remote copies.
    #[serde(default = "default_distributed_root")]
    pub distributed_root: PathBuf,

    /// Root of the distributed mount.
    #[serde(default = "default_hmdfs_root")]
    pub hmdfs_root: PathBuf,

    /// Connection-open requests allowed in flight.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_user_id() -> u32 {
    100
}

fn default_device_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "dfs-device".into())
}

fn default_network_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

fn default_sandbox_root() -> PathBuf {
    PathBuf::from("/data/app/el2")
}

fn default_distributed_root() -> PathBuf {
    PathBuf::from("/data/storage/el2/distributedfiles")
}

fn default_hmdfs_root() -> PathBuf {
    PathBuf::from("/mnt/hmdfs")
}

fn default_max_connections() -> usize {
    dfs_protocol::constants::MAX_CONCURRENT_CONNECTIONS
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            device_name: default_device_name(),
            network_id: default_network_id(),
            sandbox_root: default_sandbox_root(),
            distributed_root: default_distributed_root(),
            hmdfs_root: default_hmdfs_root(),
            max_connections: default_max_connections(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or defaults if the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// `<hmdfs_root>/<user>/account/device_view/local/data/`: where assets land.
    pub fn recv_root(&self) -> PathBuf {
        self.hmdfs_root
            .join(self.user_id.to_string())
            .join(dfs_protocol::constants::RECV_ROOT_INFIX)
    }
}

/// Configuration file path: `$DFS_DAEMON_CONFIG`, else the per-user default.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DFS_DAEMON_CONFIG") {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("dfs")
        .join("dfs-daemon.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.user_id, 100);
        assert!(!config.device_name.is_empty());
        assert_eq!(config.network_id.len(), 32);
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.hmdfs_root, PathBuf::from("/mnt/hmdfs"));
    }

    #[test]
    fn network_ids_are_random() {
        assert_ne!(default_network_id(), default_network_id());
    }

    #[test]
    fn partial_toml_takes_defaults() {
        let config: Config = toml::from_str(
            r#"
            user_id = 101
            sandbox_root = "/srv/sandbox"
            "#,
        )
        .unwrap();
        assert_eq!(config.user_id, 101);
        assert_eq!(config.sandbox_root, PathBuf::from("/srv/sandbox"));
        assert_eq!(config.max_connections, 3);
        assert_eq!(
            config.recv_root(),
            PathBuf::from("/mnt/hmdfs/101/account/device_view/local/data/")
        );
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("dfs-daemon.toml");
        std::fs::write(&path, "user_id = \"not a number\"").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.user_id, 100);
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dfs-daemon.toml");

        let config = Config {
            device_name: "tablet".into(),
            network_id: "abc123".into(),
            max_connections: 5,
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.device_name, "tablet");
        assert_eq!(loaded.network_id, "abc123");
        assert_eq!(loaded.max_connections, 5);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
