use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::DEFAULT_DOMAIN;
use crate::adapter::BackendKind;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub mdns: MdnsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Backends probed in order; the first available one is bound
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendKind>,
    /// Upper bound for a browse that waits for "at least one event"
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,
    /// Pump slice used by the async watcher between cancellation checks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MdnsConfig {
    /// Only "local." is accepted by the responder
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Restrict the responder to one interface
    #[serde(default)]
    pub interface: Option<String>,
    /// Advertised host, defaults to "<hostname>.local."
    #[serde(default)]
    pub host_name: Option<String>,
}

fn default_backends() -> Vec<BackendKind> {
    vec![BackendKind::MdnsSd]
}

fn default_idle_timeout() -> u64 {
    5000
}

fn default_poll_interval() -> u64 {
    250
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backends: default_backends(),
            idle_timeout_ms: default_idle_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for MdnsConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            interface: None,
            host_name: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
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

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.mdns.domain.trim_end_matches('.') != DEFAULT_DOMAIN.trim_end_matches('.') {
            bail!(
                "Unsupported mdns.domain {:?}: multicast DNS only serves {:?}",
                self.mdns.domain,
                DEFAULT_DOMAIN
            );
        }
        if let Some(host_name) = &self.mdns.host_name {
            if !host_name.ends_with(".local.") || host_name == ".local." {
                bail!("Invalid mdns.host_name {:?}: expected \"<name>.local.\"", host_name);
            }
        }
        Ok(())
    }
}
