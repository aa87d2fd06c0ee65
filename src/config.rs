use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::api::riot::{Endpoints, DEFAULT_BASE_URL};
use crate::services::freshness::StalenessPolicy;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Upstream API key. Filled from the `RIOT_API_KEY` environment variable
    /// when set.
    #[serde(rename = "RIOT_API_KEY", default)]
    pub api_key: String,
    /// Listening port. The `PORT` environment variable takes precedence.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_region")]
    pub region: String,
    /// Static-data API version, e.g. `v1.2`.
    #[serde(default = "default_api_version")]
    pub version: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bound on every upstream call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Directory receiving the daily access-log files.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_port() -> u16 {
    8080
}

fn default_region() -> String {
    "na".to_string()
}

fn default_api_version() -> String {
    "v1.2".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_log_dir() -> String {
    "log".to_string()
}

impl Config {
    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.base_url, &self.region, &self.version, &self.api_key)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn staleness_policy(&self) -> StalenessPolicy {
        match self.cache.policy {
            PolicyKind::Ttl => StalenessPolicy::Ttl(Duration::from_secs(self.cache.ttl_secs)),
            PolicyKind::VersionProbe => StalenessPolicy::VersionProbe {
                realm_url: self.endpoints().realm_url(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    /// Trust stored data for `ttl_secs` after the last successful fetch.
    #[default]
    Ttl,
    /// Ask the realm endpoint for the current version before every hit.
    VersionProbe,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub policy: PolicyKind,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Serve the previous payload when a refresh fails.
    #[serde(default)]
    pub serve_stale_on_error: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: PolicyKind::default(),
            ttl_secs: default_ttl_secs(),
            serve_stale_on_error: false,
        }
    }
}

fn default_ttl_secs() -> u64 {
    20 * 60
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;
    apply_env_overrides(
        &mut config,
        std::env::var("PORT").ok(),
        std::env::var("RIOT_API_KEY").ok(),
    )?;
    validate_config(&config)?;
    Ok(config)
}

fn parse_config(contents: &str) -> Result<Config> {
    Ok(serde_json::from_str(contents)?)
}

fn apply_env_overrides(
    config: &mut Config,
    port: Option<String>,
    api_key: Option<String>,
) -> Result<()> {
    if let Some(port) = port {
        config.port = port
            .parse()
            .with_context(|| format!("PORT is not a valid port number: {port}"))?;
    }
    if let Some(key) = api_key.filter(|k| !k.is_empty()) {
        config.api_key = key;
    }
    Ok(())
}

/// Basic sanity checks that cannot be expressed purely with serde.
fn validate_config(config: &Config) -> Result<()> {
    anyhow::ensure!(
        !config.api_key.is_empty(),
        "RIOT_API_KEY must be set in the config file or the environment"
    );
    anyhow::ensure!(config.cache.ttl_secs > 0, "cache.ttl_secs must be positive");
    anyhow::ensure!(config.timeout_secs > 0, "timeout_secs must be positive");
    Ok(())
}
