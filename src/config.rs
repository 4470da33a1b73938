//! Desired-state configuration.
//!
//! The file names the provider settings once and lists every managed
//! resource as a `[[resource]]` table:
//!
//! ```toml
//! [provider]
//! subscription_id = "00000000-0000-0000-0000-000000000000"
//!
//! [[resource]]
//! type = "azurerm_mongo_cluster"
//! name = "primary"
//! [resource.attributes]
//! name = "example-mc"
//! ```

use anyhow::{Context, Result, bail};
use armclient::{Client, DEFAULT_ENDPOINT, HttpTransport, PollerConfig, StaticToken};
use declarative::{Engine, Timeouts};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default config file name, looked up in the working directory first.
pub const CONFIG_FILE: &str = "armsync.toml";

/// State file name, kept next to the config file.
pub const STATE_FILE: &str = "armsync.state.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub provider: ProviderConfig,
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceConfig>,
    /// Where the file was loaded from
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub subscription_id: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_transport_failures")]
    pub max_transport_failures: u32,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_token_env() -> String {
    "ARM_ACCESS_TOKEN".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_max_transport_failures() -> u32 {
    5
}

/// One managed resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

/// Per-resource deadline overrides, in minutes.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsConfig {
    pub create: Option<u64>,
    pub read: Option<u64>,
    pub update: Option<u64>,
    pub delete: Option<u64>,
}

impl TimeoutsConfig {
    /// Apply the overrides to a kind's defaults.
    pub fn apply(&self, base: Timeouts) -> Timeouts {
        let minutes = |value: Option<u64>, default: Duration| {
            value.map_or(default, |m| Duration::from_secs(m * 60))
        };
        Timeouts {
            create: minutes(self.create, base.create),
            read: minutes(self.read, base.read),
            update: minutes(self.update, base.update),
            delete: minutes(self.delete, base.delete),
            diff: base.diff,
        }
    }
}

impl ResourceConfig {
    /// Address of the resource, `type.name`
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}

impl Config {
    /// Resolve the config path: an explicit path (with `~` expanded), then
    /// `armsync.toml` in the working directory, then the user config dir.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            return Ok(PathBuf::from(expanded));
        }

        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Ok(local);
        }

        let dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(dir.join("armsync").join(CONFIG_FILE))
    }

    /// Load and validate the config file.
    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.path = path.to_path_buf();
        Ok(config)
    }

    /// Parse and validate config text.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.provider.subscription_id = shellexpand::env(&config.provider.subscription_id)
            .context("Failed to expand subscription_id")?
            .into_owned();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.provider.subscription_id.trim().is_empty() {
            bail!("provider.subscription_id must not be empty");
        }
        if self.provider.poll_interval_secs == 0 {
            bail!("provider.poll_interval_secs must be at least 1");
        }

        let mut seen = HashSet::new();
        for resource in &self.resources {
            if resource.name.is_empty() || resource.name.contains('.') {
                bail!(
                    "invalid resource name '{}' for type {}: names must be non-empty and contain no '.'",
                    resource.name,
                    resource.resource_type
                );
            }
            if !seen.insert(resource.address()) {
                bail!("duplicate resource address: {}", resource.address());
            }
        }
        Ok(())
    }

    /// Path of the state file that belongs to this config.
    pub fn state_path(&self) -> PathBuf {
        self.path.with_file_name(STATE_FILE)
    }

    /// Find a resource by address.
    pub fn resource(&self, address: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.address() == address)
    }

    fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            default_interval: Duration::from_secs(self.provider.poll_interval_secs),
            max_transport_failures: self.provider.max_transport_failures,
        }
    }

    /// Build the lifecycle engine, reading the token from the environment.
    pub fn engine(&self) -> Result<Engine> {
        let token = std::env::var(&self.provider.token_env).with_context(|| {
            format!(
                "No access token: set {} to a bearer token for {}",
                self.provider.token_env, self.provider.endpoint
            )
        })?;
        let transport = HttpTransport::new(Box::new(StaticToken::new(token)));
        let client = Client::new(Arc::new(transport), self.provider.endpoint.clone())
            .with_poller_config(self.poller_config());
        Ok(Engine::new(client, self.provider.subscription_id.clone()))
    }
}
