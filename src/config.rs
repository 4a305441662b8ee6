use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::bucket::DEFAULT_FILE_PREFIX;
use crate::channel::DEFAULT_SOCKET_PATH;
use crate::error::StatError;
use crate::merge::ConflictPolicy;
use crate::report::ParseErrorPolicy;

/// Config file looked up in the working directory when `CONFIG_FILE` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "map646-stat.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub daemon: DaemonConfig,
    pub storage: StorageConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: PathBuf,
    pub connect_timeout_ms: u64,
    /// Upper bound for one command exchange once connected.
    pub io_timeout_ms: u64,
    pub max_payload_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            connect_timeout_ms: 2_000,
            io_timeout_ms: 5_000,
            max_payload_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Used when `-d` is not given.
    pub base_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub conflict_policy: ConflictPolicy,
    pub on_parse_error: ParseErrorPolicy,
}

impl AppConfig {
    /// Loads `path`, else `CONFIG_FILE`, else `map646-stat.toml` if present, else defaults.
    /// An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("CONFIG_FILE").map(PathBuf::from));
        let path = match explicit {
            Some(p) => p,
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let s = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("config {}: {}", path.display(), e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.daemon.socket_path.as_os_str().is_empty(),
            "daemon.socket_path must be non-empty"
        );
        anyhow::ensure!(
            self.daemon.connect_timeout_ms > 0,
            "daemon.connect_timeout_ms must be > 0, got {}",
            self.daemon.connect_timeout_ms
        );
        anyhow::ensure!(
            self.daemon.io_timeout_ms > 0,
            "daemon.io_timeout_ms must be > 0, got {}",
            self.daemon.io_timeout_ms
        );
        anyhow::ensure!(
            self.daemon.max_payload_bytes > 0,
            "daemon.max_payload_bytes must be > 0, got {}",
            self.daemon.max_payload_bytes
        );
        anyhow::ensure!(
            !self.storage.file_prefix.is_empty(),
            "storage.file_prefix must be non-empty"
        );
        anyhow::ensure!(
            !self.storage.file_prefix.contains('/'),
            "storage.file_prefix must not contain '/', got {:?}",
            self.storage.file_prefix
        );
        Ok(())
    }

    /// The `-d` flag wins over `storage.base_dir`; having neither is a config error.
    pub fn base_dir(&self, flag: Option<&Path>) -> Result<PathBuf, StatError> {
        flag.map(Path::to_path_buf)
            .or_else(|| self.storage.base_dir.clone())
            .ok_or_else(|| {
                StatError::Config(
                    "missing base directory: pass -d DIR or set storage.base_dir".to_string(),
                )
            })
    }
}
