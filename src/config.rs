use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::{trace, warn};

use crate::actions::StaticInventory;
use crate::checks::Interval;
use crate::util;

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub intervals: IntervalsConfig,
    #[serde(default)]
    pub alerting: AlertingConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub inventory: StaticInventory,
}

/// Where signed checks come from
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChecksConfig {
    #[serde(default = "default_checks_url")]
    pub url: String,
    #[serde(default = "default_public_keys")]
    pub public_keys: Vec<String>,
    /// Seconds between downloads
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval: u64,
    /// Seconds a single download may take
    #[serde(default = "default_fetch_timeout")]
    pub timeout: u64,
    /// Unsigned local bundle used instead of downloading
    pub file: Option<PathBuf>,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            url: default_checks_url(),
            public_keys: default_public_keys(),
            fetch_interval: default_fetch_interval(),
            timeout: default_fetch_timeout(),
            file: None,
        }
    }
}

fn default_checks_url() -> String {
    String::from("https://check.percona.com")
}

fn default_public_keys() -> Vec<String> {
    vec![String::from(
        "RWSKCHyoLDYxJ1k0qeayKu3/fsXVS1z8M+0deAClryiHWP99Sr4R/gPP",
    )]
}

fn default_fetch_interval() -> u64 {
    24 * 3600
}

fn default_fetch_timeout() -> u64 {
    5
}

/// Run intervals of the check classes, in seconds
#[derive(Debug, Clone, serde::Deserialize)]
pub struct IntervalsConfig {
    #[serde(default = "default_standard_interval")]
    pub standard: u64,
    #[serde(default = "default_rare_interval")]
    pub rare: u64,
    #[serde(default = "default_frequent_interval")]
    pub frequent: u64,
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            standard: default_standard_interval(),
            rare: default_rare_interval(),
            frequent: default_frequent_interval(),
        }
    }
}

impl IntervalsConfig {
    /// How often checks of the class run, which is also how often their alerts are resent
    pub fn resend_interval(&self, interval: Interval) -> Duration {
        let secs = match interval {
            Interval::Standard => self.standard,
            Interval::Rare => self.rare,
            Interval::Frequent => self.frequent,
        };
        Duration::from_secs(secs.max(1))
    }
}

fn default_standard_interval() -> u64 {
    24 * 3600
}

fn default_rare_interval() -> u64 {
    78 * 3600
}

fn default_frequent_interval() -> u64 {
    4 * 3600
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AlertingConfig {
    /// Base URL of Alertmanager; alerts are only kept locally without it
    pub alertmanager_url: Option<String>,
    /// Seconds between pushes
    #[serde(default = "default_push_interval")]
    pub push_interval: u64,
    #[serde(default = "default_push_timeout")]
    pub timeout: u64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            alertmanager_url: None,
            push_interval: default_push_interval(),
            timeout: default_push_timeout(),
        }
    }
}

fn default_push_interval() -> u64 {
    60
}

fn default_push_timeout() -> u64 {
    10
}

/// Action dispatch and result retention, all in seconds
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ActionsConfig {
    /// Pending results older than this are failed with a timeout
    #[serde(default = "default_pending_timeout")]
    pub pending_timeout: u64,
    /// Finished results are dropped this long after completion
    #[serde(default = "default_retention")]
    pub retention: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
    /// Timeout of requests to agents
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout: u64,
    /// How long a check waits for its query action
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            pending_timeout: default_pending_timeout(),
            retention: default_retention(),
            sweep_interval: default_sweep_interval(),
            agent_timeout: default_agent_timeout(),
            query_timeout: default_query_timeout(),
        }
    }
}

fn default_pending_timeout() -> u64 {
    3600
}

fn default_retention() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_agent_timeout() -> u64 {
    10
}

fn default_query_timeout() -> u64 {
    30
}

impl Config {
    /// Apply the test-only environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(host) = util::get_checks_host() {
            warn!("checks host overridden: {host}");
            self.checks.url = host;
        }
        if let Some(keys) = util::get_checks_public_keys() {
            warn!("checks public keys overridden: {keys:?}");
            self.checks.public_keys = keys;
        }
        if let Some(interval) = util::get_checks_interval() {
            warn!("checks fetch interval overridden: {interval}s");
            self.checks.fetch_interval = interval;
        }
        if let Some(timeout) = util::get_checks_timeout() {
            warn!("checks fetch timeout overridden: {timeout}s");
            self.checks.timeout = timeout;
        }
        if let Some(file) = util::get_checks_file() {
            warn!("using local checks file {}", file.display());
            self.checks.file = Some(file);
        }
    }
}

pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
