use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::transport::ReconnectPolicy;

/// Reconnect policy parameters for the worker socket (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Maximum number of connection attempts (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 5,
        }
    }
}

impl ReconnectConfig {
    /// Fails when `base_delay_secs` is negative, NaN or infinite.
    pub fn policy(&self) -> Result<ReconnectPolicy> {
        let base_delay = Duration::try_from_secs_f64(self.base_delay_secs).with_context(|| {
            format!(
                "reconnect.base_delay_secs = {} is not a valid delay",
                self.base_delay_secs
            )
        })?;
        Ok(ReconnectPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(self.max_delay_secs),
        })
    }
}

/// Global configuration loaded from `~/.config/rwl/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Seconds between keepalive pings while a load is in flight.
    pub keepalive_interval_secs: u64,
    /// Whether the host context counts as secure (worker channels require it).
    pub secure_context: bool,
    /// Running as a packaged application (enables ipfs:// proxying).
    pub packaged_app: bool,
    /// Host name reported in platform errors.
    pub host: String,
    /// Whether local files can be reopened through a file-handle flow.
    pub file_handles: bool,
    /// File-serving prefix of the packaged app, e.g. "http://localhost:9990/replay/".
    #[serde(default)]
    pub file_serve_prefix: Option<String>,
    /// Worker socket path; defaults to `worker.sock` in the XDG runtime (or state) dir.
    #[serde(default)]
    pub worker_socket: Option<PathBuf>,
    /// Optional reconnect policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub reconnect: Option<ReconnectConfig>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: 15,
            secure_context: true,
            packaged_app: false,
            host: "localhost".to_string(),
            file_handles: true,
            file_serve_prefix: None,
            worker_socket: None,
            reconnect: None,
        }
    }
}

impl LoaderConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs.max(1))
    }

    pub fn reconnect_policy(&self) -> Result<ReconnectPolicy> {
        self.reconnect.clone().unwrap_or_default().policy()
    }

    /// Configured worker socket, or the default under the XDG dirs.
    pub fn worker_socket_path(&self) -> Result<PathBuf> {
        match &self.worker_socket {
            Some(p) => Ok(p.clone()),
            None => default_worker_socket_path(),
        }
    }
}

/// Default worker socket: `$XDG_RUNTIME_DIR/rwl/worker.sock`, falling back to
/// the state dir when no runtime dir is set.
pub fn default_worker_socket_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rwl")?;
    let dir = xdg_dirs
        .get_runtime_directory()
        .map(|d| d.join("rwl"))
        .unwrap_or_else(|_| xdg_dirs.get_state_home());
    Ok(dir.join("worker.sock"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rwl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<LoaderConfig> {
    let path = config_path()?;
    load_or_init_at(&path)
}

pub fn load_or_init_at(path: &std::path::Path) -> Result<LoaderConfig> {
    if !path.exists() {
        let default_cfg = LoaderConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: LoaderConfig = toml::from_str(&data)?;
    Ok(cfg)
}
