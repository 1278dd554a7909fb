//! Configuration for the ws-hub listeners
//!
//! Every section has defaults, so a missing or empty file yields a working
//! configuration pointing at a local broker with the `ws-hub` prefix.

use crate::broker::channel::{validate_prefix, NamespaceError};
use crate::broker::{parse_broker_url, ChannelNamespace, DEFAULT_BROKER_URL, DEFAULT_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Overrides `broker.url`
pub const BROKER_URL_ENV: &str = "WSHUB_BROKER_URL";
/// Overrides `broker.prefix`
pub const CHANNEL_PREFIX_ENV: &str = "WSHUB_CHANNEL_PREFIX";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HubConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub listeners: ListenerSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
}

/// Broker section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URL: `redis://host:port/db`
    #[serde(default = "default_broker_url")]
    pub url: String,
    /// Namespace prefix shared by every channel
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            prefix: default_prefix(),
        }
    }
}

fn default_broker_url() -> String {
    DEFAULT_BROKER_URL.to_string()
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

/// Listener behavior
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenerSection {
    /// Groups every newly registered client joins
    #[serde(default = "default_initial_groups")]
    pub initial_groups: Vec<String>,
}

impl Default for ListenerSection {
    fn default() -> Self {
        Self {
            initial_groups: default_initial_groups(),
        }
    }
}

fn default_initial_groups() -> Vec<String> {
    ["1", "2", "all", "news"]
        .iter()
        .map(|g| g.to_string())
        .collect()
}

impl ListenerSection {
    /// Payload published on `groups-new:{client}`: comma separated group ids
    pub fn groups_payload(&self) -> String {
        self.initial_groups.join(",")
    }
}

/// Reconnection after a lost broker connection
///
/// `max_attempts = 0` ends a listener on its first connection error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    #[serde(default)]
    pub max_attempts: u32,
    /// Delay per attempt in milliseconds; the last entry repeats via
    /// `sustained_delay_ms`
    #[serde(default = "default_backoff_pattern")]
    pub backoff_pattern_ms: Vec<u64>,
    #[serde(default = "default_sustained_delay")]
    pub sustained_delay_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            backoff_pattern_ms: default_backoff_pattern(),
            sustained_delay_ms: default_sustained_delay(),
        }
    }
}

fn default_backoff_pattern() -> Vec<u64> {
    vec![100, 250, 500, 1000]
}

fn default_sustained_delay() -> u64 {
    2000
}

impl ReconnectSection {
    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Backoff delay for a 1-based attempt number
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        let millis = self
            .backoff_pattern_ms
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay_ms);
        Duration::from_millis(millis)
    }

    /// Upper bound on time spent sleeping across all attempts
    pub fn max_total_delay(&self) -> Duration {
        (1..=self.max_attempts)
            .map(|attempt| self.backoff_delay(attempt))
            .sum()
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid channel prefix: {0}")]
    InvalidPrefix(#[from] NamespaceError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl HubConfig {
    /// Load configuration from a TOML file, apply environment overrides and
    /// validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse, apply environment overrides and validate
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: HubConfig = toml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = HubConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(url) = get_env_var_optional(BROKER_URL_ENV) {
            self.broker.url = url;
        }
        if let Some(prefix) = get_env_var_optional(CHANNEL_PREFIX_ENV) {
            self.broker.prefix = prefix;
        }
    }

    /// Check every section for values the listeners cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_broker_url(&self.broker.url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(self.broker.url.clone()))?;
        validate_prefix(&self.broker.prefix)?;
        validate_groups(&self.listeners.initial_groups)?;
        Ok(())
    }

    /// Namespace built from `broker.prefix`
    pub fn namespace(&self) -> Result<ChannelNamespace, ConfigError> {
        Ok(ChannelNamespace::new(&self.broker.prefix)?)
    }
}

fn get_env_var_optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Groups travel as a comma separated list, so entries cannot contain commas
fn validate_groups(groups: &[String]) -> Result<(), ConfigError> {
    if groups.is_empty() {
        return Err(ConfigError::InvalidConfig(
            "listeners.initial_groups cannot be empty".to_string(),
        ));
    }

    for group in groups {
        if group.trim().is_empty() || group.contains(',') {
            return Err(ConfigError::InvalidConfig(format!(
                "invalid group identifier '{group}' in listeners.initial_groups"
            )));
        }
    }

    Ok(())
}
