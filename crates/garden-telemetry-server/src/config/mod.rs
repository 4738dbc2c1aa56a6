//! Configuration loading and resolution.
//!
//! A single TOML file carries the core pipeline settings at the top level
//! plus the server-only `[server]` table and the `[[devices]]` dispatcher
//! registry:
//!
//! ```toml
//! [store]
//! path = "garden.db"
//!
//! [heatmap]
//! window_seconds = 72000
//! base_map = "data/garden_map.png"
//!
//! [server]
//! bind = "0.0.0.0:5000"
//!
//! [[devices]]
//! name = "carrot patch"
//! addr = "127.0.0.1:9090"
//! methods = ["GET", "POST"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use garden_telemetry::TelemetryConfig;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "GARDEN_TELEMETRY_CONFIG";

/// Configuration file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "garden-telemetry.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub telemetry: TelemetryConfig,

    pub server: HttpConfig,

    /// Dispatcher registry of garden devices.
    pub devices: Vec<DeviceEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryConfig::default(),
            server: HttpConfig::default(),
            devices: default_devices(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address (host:port).
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

/// A device reachable through the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    /// Friendly name; the dispatcher uid is its hex encoding.
    pub name: String,
    pub addr: String,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
}

impl DeviceEntry {
    pub fn new(name: &str, addr: &str, methods: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            addr: addr.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

fn default_devices() -> Vec<DeviceEntry> {
    vec![
        DeviceEntry::new("carrot patch", "127.0.0.1:9090", &["GET", "POST"]),
        DeviceEntry::new("front lawn", "127.0.0.1:8080", &["GET", "POST"]),
        DeviceEntry::new("duck pond", "127.0.0.1:1010", &["GET"]),
    ]
}

impl ServerConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
        Self::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.telemetry.validate()?;
        Ok(config)
    }

    /// Load the resolved configuration file, or the built-in defaults when
    /// none exists.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match resolve_config_path(explicit) {
            Some(path) => {
                tracing::info!("Loading config from {}", path.display());
                Self::load(&path)
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Resolve the configuration file path: explicit flag, then
/// `GARDEN_TELEMETRY_CONFIG`, then `./garden-telemetry.toml` if present.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_config = PathBuf::from(DEFAULT_CONFIG_FILE);
    cwd_config.exists().then_some(cwd_config)
}
