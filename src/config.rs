//! Proxy and file server configuration
//!
//! The proxy reads an optional YAML file (path in `NATPROXY_CONFIG`) and then
//! lets `LISTEN` / `UPSTREAM` override the addresses.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the proxy accepts clients on
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream file server, as `host:port`
    pub addr: String,

    /// Upper bound on establishing one upstream connection
    pub connect_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9001".to_string(),
            connect_timeout_ms: 5000,
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
}

impl Config {
    /// Load the proxy configuration from the file named by `NATPROXY_CONFIG`
    /// (if any), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var("NATPROXY_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen;
        }
        if let Ok(upstream) = std::env::var("UPSTREAM") {
            cfg.upstream.addr = upstream;
        }

        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Settings for the `file-server` binary.
#[derive(Debug, Clone)]
pub struct FileServerConfig {
    pub listen_addr: String,
    pub root: PathBuf,
}

impl FileServerConfig {
    pub fn load() -> Self {
        let listen_addr =
            std::env::var("FILES_LISTEN")
                .unwrap_or_else(|_| "127.0.0.1:9001".to_string());
        let root = std::env::var("FILES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("files"));
        Self { listen_addr, root }
    }
}
