//! Layered configuration for the dashboard server.
//!
//! Settings are read from `taskmon.toml`, overridden by `TASKMON_*`
//! environment variables, then by CLI flags (applied in `main`).
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! port = 3030
//! host = "127.0.0.1"
//! dev_mode = false
//!
//! [storage]
//! data_dir = "sources"
//! max_upload_bytes = 10485760
//!
//! [refresh]
//! enabled = true
//! interval_secs = 5
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "taskmon.toml";

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind on all interfaces and allow permissive CORS.
    #[serde(default)]
    pub dev_mode: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            dev_mode: false,
        }
    }
}

/// Registry storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Root of the source registry (sources.json, files/, uploads/).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Upper bound on upload request bodies.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Background refresh sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshSection {
    #[serde(default = "default_refresh_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            enabled: default_refresh_enabled(),
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_port() -> u16 {
    3030
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("sources")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_refresh_enabled() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    5
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub refresh: RefreshSection,
}

impl MonitorConfig {
    /// Load configuration: file (if present) → environment overrides.
    /// CLI flags are layered on top by the caller.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(CONFIG_FILE);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&data)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("TASKMON_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %port, "ignoring unparsable TASKMON_PORT"),
            }
        }
        if let Ok(dir) = std::env::var("TASKMON_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
    }

    /// The bind host, widened in dev mode.
    pub fn bind_host(&self) -> &str {
        if self.server.dev_mode {
            "0.0.0.0"
        } else {
            &self.server.host
        }
    }
}
