use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::common::error::SimScaleError;
use crate::planner::ladder::{LadderStep, SkuLadder};

/// Config file used when neither `--config` nor `SIMSCALE_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "configs/simscale.toml";

/// Environment variables forwarded into every task container.
pub const WORKSPACE_ENV: &str = "SIM_WORKSPACE";
pub const ACCESS_KEY_ENV: &str = "SIM_ACCESS_KEY";

mod human_duration {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let buf = String::deserialize(deserializer)?;
        humantime::parse_duration(&buf).map_err(serde::de::Error::custom)
    }
}

/// Operating system of the pool nodes and of the container image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HostOs {
    #[default]
    Linux,
    Windows,
}

impl HostOs {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostOs::Linux => "linux",
            HostOs::Windows => "windows",
        }
    }

    pub fn opposite(&self) -> HostOs {
        match self {
            HostOs::Linux => HostOs::Windows,
            HostOs::Windows => HostOs::Linux,
        }
    }
}

impl Display for HostOs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchAccountConfig {
    pub account_name: String,
    pub account_url: String,
    #[serde(default)]
    pub account_key: Option<String>,
    #[serde(default)]
    pub resource_group: Option<String>,
    /// Azure region, also used for price lookups.
    pub location: String,
    /// Path to the Azure CLI.
    #[serde(default = "default_batch_cli")]
    pub cli_path: String,
    #[serde(default = "default_batch_timeout", with = "human_duration")]
    pub command_timeout: Duration,
}

fn default_batch_cli() -> String {
    "az".to_string()
}

fn default_batch_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

/// Container registry holding the simulator image.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerConfig {
    pub server: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub image_name: String,
    #[serde(default = "default_image_version")]
    pub image_version: String,
    #[serde(default)]
    pub platform: HostOs,
}

impl ContainerConfig {
    /// Fully qualified image reference, `<server>/<name>:<version>`.
    pub fn image_reference(&self) -> String {
        format!("{}/{}:{}", self.server, self.image_name, self.image_version)
    }
}

fn default_image_version() -> String {
    "latest".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NodeImageConfig {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    #[serde(default = "default_image_version")]
    pub version: String,
}

impl Default for NodeImageConfig {
    fn default() -> Self {
        Self {
            publisher: "microsoft-azure-batch".to_string(),
            offer: "ubuntu-server-container".to_string(),
            sku: "20-04-lts".to_string(),
            version: default_image_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PoolConfig {
    pub node_image: NodeImageConfig,
    pub node_agent_sku: String,
    pub low_priority_nodes: u32,
    pub dedicated_nodes: u32,
    pub pool_id: Option<String>,
    pub job_name: Option<String>,
    /// Delay slept between two task submissions.
    #[serde(with = "human_duration")]
    pub task_stagger: Duration,
    /// Window between showing the cost estimate and submitting tasks.
    #[serde(with = "human_duration")]
    pub price_pause: Duration,
    #[serde(with = "human_duration")]
    pub wait_timeout: Duration,
    pub ladder: Vec<LadderStep>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            node_image: NodeImageConfig::default(),
            node_agent_sku: "batch.node.ubuntu 20.04".to_string(),
            low_priority_nodes: 9,
            dedicated_nodes: 1,
            pool_id: None,
            job_name: None,
            task_stagger: Duration::ZERO,
            price_pause: Duration::from_secs(10),
            wait_timeout: Duration::from_secs(2 * 60 * 60),
            ladder: SkuLadder::default().into_steps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileShareConfig {
    pub account_name: String,
    pub account_key: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PricingConfig {
    pub base_url: String,
    #[serde(with = "human_duration")]
    pub timeout: Duration,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://azureprice.net/".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkspaceConfig {
    pub workspace_id: Option<String>,
    pub access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReconnectConfig {
    /// Path to the session registry CLI.
    pub cli_path: String,
    /// Limit for a single listing or connect command.
    #[serde(with = "human_duration")]
    pub command_timeout: Duration,
    #[serde(with = "human_duration")]
    pub retry_wait: Duration,
    pub max_retries: u32,
    /// Pause between two reconnection cycles.
    #[serde(with = "human_duration")]
    pub interval: Duration,
    /// Number of consecutive exhausted cycles after which the scan direction flips.
    /// Zero disables reversal.
    pub reverse_after_failed_cycles: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            cli_path: "bonsai".to_string(),
            command_timeout: Duration::from_secs(15 * 60),
            retry_wait: Duration::from_secs(60),
            max_retries: 10,
            interval: Duration::from_secs(5 * 60),
            reverse_after_failed_cycles: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimScaleConfig {
    pub batch: BatchAccountConfig,
    pub container: ContainerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub fileshare: Option<FileShareConfig>,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl SimScaleConfig {
    pub fn from_toml(text: &str) -> crate::Result<Self> {
        let config: SimScaleConfig = toml::from_str(text)
            .map_err(|e| SimScaleError::InvalidConfiguration(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Fills workspace credentials that are missing in the file from `lookup`,
    /// which is usually the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(workspace) = lookup(WORKSPACE_ENV).filter(|v| !v.is_empty()) {
            self.workspace.workspace_id = Some(workspace);
        }
        if let Some(key) = lookup(ACCESS_KEY_ENV).filter(|v| !v.is_empty()) {
            self.workspace.access_key = Some(key);
        }
    }

    pub fn ladder(&self) -> crate::Result<SkuLadder> {
        SkuLadder::new(self.pool.ladder.clone())
    }

    /// Workspace id and access key passed to the simulator containers.
    pub fn workspace_credentials(&self) -> crate::Result<(String, String)> {
        match (&self.workspace.workspace_id, &self.workspace.access_key) {
            (Some(workspace), Some(key)) => Ok((workspace.clone(), key.clone())),
            _ => Err(SimScaleError::InvalidConfiguration(format!(
                "Workspace credentials are missing, set [workspace] in the config file or the {WORKSPACE_ENV} and {ACCESS_KEY_ENV} environment variables"
            ))),
        }
    }

    fn validate(&self) -> crate::Result<()> {
        let required = [
            ("batch.account_name", &self.batch.account_name),
            ("batch.account_url", &self.batch.account_url),
            ("batch.location", &self.batch.location),
            ("container.server", &self.container.server),
            ("container.image_name", &self.container.image_name),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(SimScaleError::InvalidConfiguration(format!(
                    "Field `{name}` must not be empty"
                )));
            }
        }
        if self.reconnect.max_retries == 0 {
            return Err(SimScaleError::InvalidConfiguration(
                "Field `reconnect.max_retries` must be at least 1".to_string(),
            ));
        }
        self.ladder()?;
        Ok(())
    }
}

/// Path of the config file: explicit path or the default location.
pub fn resolve_config_path(path: Option<&Path>) -> PathBuf {
    path.map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_config(path: &Path) -> crate::Result<SimScaleConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        SimScaleError::InvalidConfiguration(format!(
            "Cannot read config file {}: {e}",
            path.display()
        ))
    })?;
    let mut config = SimScaleConfig::from_toml(&text)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    log::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}
