use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error;

// --- Error Type ---
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

// --- Enums for Choices ---
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SerializerType {
    #[default]
    Json,
    Binary,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    #[default]
    Stdio,
    Null,
    File,
}

// --- Configuration Sections ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TickSettings {
    /// Wall-clock time between two ticks.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// How far a tick may overrun before the loop drops the missed ticks.
    #[serde(default = "default_overrun_slack_ms")]
    pub overrun_slack_ms: u64,
    /// Log an error when a single tick takes longer than this.
    #[serde(default)]
    pub watchdog_ms: Option<u64>,
}

fn default_interval_ms() -> u64 { 50 }
fn default_overrun_slack_ms() -> u64 { 100 }

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            overrun_slack_ms: default_overrun_slack_ms(),
            watchdog_ms: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GroupConfig {
    pub name: String,
    pub priority: i32,
}

fn default_groups() -> Vec<GroupConfig> {
    [("network", 700), ("system", 600), ("program", 500), ("cleanup", 100)]
        .into_iter()
        .map(|(name, priority)| GroupConfig { name: name.to_string(), priority })
        .collect()
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SerializerConfig {
    #[serde(rename = "type")]
    pub serializer_type: SerializerType,
    pub options: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SenderConfig {
    #[serde(rename = "type")]
    pub sender_type: SenderType,
    pub options: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub serializer: SerializerConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    /// Ticks between two event relays.
    #[serde(default = "default_relay_every")]
    pub relay_every: u32,
}

fn default_relay_every() -> u32 { 1 }

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            serializer: SerializerConfig::default(),
            sender: SenderConfig::default(),
            relay_every: default_relay_every(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WorldSettings {
    /// Demo computers created at startup.
    #[serde(default = "default_computers")]
    pub computers: u32,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_computers() -> u32 { 2 }

impl Default for WorldSettings {
    fn default() -> Self {
        Self { computers: default_computers(), seed: None }
    }
}

// --- Top-Level Config Struct ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub tick: TickSettings,
    #[serde(default = "default_groups")]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub world: WorldSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick: TickSettings::default(),
            groups: default_groups(),
            bridge: BridgeConfig::default(),
            world: WorldSettings::default(),
        }
    }
}

// --- File Sender Options ---
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileOptions {
    pub path: PathBuf,
    #[serde(default)]
    pub append: bool,
}

impl SenderConfig {
    /// Options of a `file` sender; `None` if absent or malformed.
    pub fn get_file_options(&self) -> Option<FileOptions> {
        let value = self.options.as_ref()?;
        serde_json::from_value(value.clone()).ok()
    }
}

// --- Validation ---

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick.interval_ms == 0 {
            return Err(ConfigError::Validation("tick.interval_ms cannot be zero.".to_string()));
        }
        if self.tick.watchdog_ms == Some(0) {
            return Err(ConfigError::Validation("tick.watchdog_ms cannot be zero.".to_string()));
        }
        if self.groups.is_empty() {
            return Err(ConfigError::Validation("At least one scheduler group is required.".to_string()));
        }
        let mut seen = HashSet::new();
        for group in &self.groups {
            if group.name.trim().is_empty() {
                return Err(ConfigError::Validation("Scheduler group names cannot be empty.".to_string()));
            }
            if !seen.insert(group.name.as_str()) {
                return Err(ConfigError::Validation(format!("Duplicate scheduler group '{}'.", group.name)));
            }
        }
        if self.bridge.relay_every == 0 {
            return Err(ConfigError::Validation("bridge.relay_every cannot be zero.".to_string()));
        }
        if self.bridge.sender.sender_type == SenderType::File && self.bridge.sender.get_file_options().is_none() {
            return Err(ConfigError::Validation("The 'file' sender needs options with a 'path'.".to_string()));
        }
        Ok(())
    }
}

// --- Loading Functions ---

pub fn parse_json(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_toml(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Loads `path`: `.toml` files as TOML, everything else as JSON.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    let is_toml = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    debug!("Loading {} config from {}", if is_toml { "TOML" } else { "JSON" }, path.display());
    if is_toml {
        parse_toml(&content)
    } else {
        parse_json(&content)
    }
}
