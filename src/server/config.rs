//! Configuration loading for fanartd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.fanartd/config.toml` (user)
//! 3. `/etc/fanartd/config.toml` (system)
//! 4. built-in defaults
//!
//! Every field has a default, so a config file only needs the values that
//! differ.

use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::info;

use crate::cache::DEFAULT_MAX_ENTRIES;
use crate::resolver::{
    DEFAULT_BOOTSTRAP_URL, DEFAULT_BROWSER_USER_AGENT, DEFAULT_EPISODES_URL,
    DEFAULT_PLACEHOLDER_IMAGE_PREFIX, DEFAULT_SITE_URL, DEFAULT_USER_AGENT, ResolverConfig,
};
use crate::{FanartError, Result};

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0:8880).
    #[serde(default = "default_address")]
    pub address: String,
    /// Seconds clients are asked to wait while the bootstrap dataset is
    /// unavailable (default: 5).
    #[serde(default = "default_retry_after")]
    pub retry_after_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            retry_after_secs: default_retry_after(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:8880".to_string()
}

fn default_retry_after() -> u64 {
    5
}

/// Cache sizing and expiry.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in seconds; 0 disables expiry (default: 60).
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    /// Maximum number of cached entries (default: 100000).
    ///
    /// Must comfortably exceed the bootstrap dataset size plus the working
    /// set of upstream responses; bootstrap entries beyond capacity may be
    /// evicted and are then re-resolved by scraping.
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Seconds between expired-entry sweeps; 0 disables sweeping
    /// (default: 300).
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            max_entries: default_max_entries(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl CacheConfig {
    /// Default TTL for cache writes, `None` when expiry is disabled.
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }

    /// Sweep interval, `None` when sweeping is disabled.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
    }
}

fn default_ttl() -> u64 {
    60
}

fn default_max_entries() -> u64 {
    DEFAULT_MAX_ENTRIES
}

fn default_cleanup_interval() -> u64 {
    300
}

/// Upstream sources.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_bootstrap_url")]
    pub bootstrap_url: String,
    /// Episode listing URL template; `{id}` is replaced by the show id.
    #[serde(default = "default_episodes_url")]
    pub episodes_url: String,
    #[serde(default = "default_site_url")]
    pub site_url: String,
    #[serde(default = "default_placeholder_prefix")]
    pub placeholder_image_prefix: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_browser_user_agent")]
    pub browser_user_agent: String,
    /// Per-request timeout in seconds (default: 10).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            bootstrap_url: default_bootstrap_url(),
            episodes_url: default_episodes_url(),
            site_url: default_site_url(),
            placeholder_image_prefix: default_placeholder_prefix(),
            user_agent: default_user_agent(),
            browser_user_agent: default_browser_user_agent(),
            timeout_secs: default_timeout(),
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl From<UpstreamConfig> for ResolverConfig {
    fn from(upstream: UpstreamConfig) -> Self {
        Self {
            bootstrap_url: upstream.bootstrap_url,
            episodes_url: upstream.episodes_url,
            site_url: upstream.site_url,
            placeholder_image_prefix: upstream.placeholder_image_prefix,
            user_agent: upstream.user_agent,
            browser_user_agent: upstream.browser_user_agent,
        }
    }
}

fn default_bootstrap_url() -> String {
    DEFAULT_BOOTSTRAP_URL.to_string()
}

fn default_episodes_url() -> String {
    DEFAULT_EPISODES_URL.to_string()
}

fn default_site_url() -> String {
    DEFAULT_SITE_URL.to_string()
}

fn default_placeholder_prefix() -> String {
    DEFAULT_PLACEHOLDER_IMAGE_PREFIX.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_browser_user_agent() -> String {
    DEFAULT_BROWSER_USER_AGENT.to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, the first existing file of
    /// `~/.fanartd/config.toml` and `/etc/fanartd/config.toml` is used, and
    /// defaults apply if neither exists.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => {
                info!("no config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a specific config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FanartError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            FanartError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Resolve the config file path, if any.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(FanartError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".fanartd").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/fanartd/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// The listen address, with the port optionally overridden.
    pub fn socket_addr(&self, port_override: Option<u16>) -> Result<SocketAddr> {
        let mut addr: SocketAddr = self.server.address.parse().map_err(|e| {
            FanartError::Configuration(format!(
                "Invalid address {:?}: {e}",
                self.server.address
            ))
        })?;
        if let Some(port) = port_override {
            addr.set_port(port);
        }
        Ok(addr)
    }
}
