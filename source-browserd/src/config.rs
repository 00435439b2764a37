use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{BY_NAME_PREFIX, RTSP_SERVICE_TYPE};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub browser: BrowserConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Network interface the mDNS client is bound to
    pub interface: String,
    #[serde(default = "default_service_type")]
    pub service_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Fallback reap interval; completion notices trigger reaps in between
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_service_type() -> String {
    RTSP_SERVICE_TYPE.to_string()
}

fn default_path_prefix() -> String {
    BY_NAME_PREFIX.to_string()
}

fn default_connect_timeout() -> u64 {
    2000
}

fn default_io_timeout() -> u64 {
    5000
}

fn default_reap_interval() -> u64 {
    5
}

fn default_listen() -> String {
    "[::]:8090".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            connect_timeout_ms: default_connect_timeout(),
            io_timeout_ms: default_io_timeout(),
        }
    }
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            reap_interval_secs: default_reap_interval(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        if config.browser.interface.is_empty() {
            anyhow::bail!("browser.interface must not be empty");
        }
        Ok(config)
    }
}
