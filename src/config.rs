//! Configuration loading and validation.
//!
//! The TOML config is read once, validated, and handed to the manager by
//! value; nothing in the core holds a shared mutable view of it. Per-module
//! blocks seed module identity and allow/deny lists at construction time
//! only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Top-level bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Bot identity.
    pub bot: IdentityConfig,
    /// Network to connect to.
    pub network: NetworkConfig,
    /// Channels joined once connected.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Directory for per-module log files (default "./logs").
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Access-group seeds (group name -> nicks).
    #[serde(default)]
    pub access: HashMap<String, Vec<String>>,
    /// Per-module configuration blocks.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

impl BotConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BotConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields. Called by [`load`](Self::load) and again by
    /// the manager before connecting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.nick.is_empty() {
            return Err(ConfigError::Missing("bot.nick"));
        }
        if self.network.server.is_empty() {
            return Err(ConfigError::Missing("network.server"));
        }
        Ok(())
    }
}

/// Bot identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Nick used on the network.
    pub nick: String,
    /// Ident, defaulting to the nick.
    #[serde(default)]
    pub ident: Option<String>,
    /// Real name, defaulting to the nick.
    #[serde(default)]
    pub realname: Option<String>,
    /// Services password, sent to NickServ after connecting.
    #[serde(default)]
    pub password: Option<String>,
    /// Quit message.
    #[serde(default)]
    pub quit_message: Option<String>,
}

/// Network configuration. Opaque to the core beyond the server name used in
/// the connected banner; the transport implementation consumes the rest.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Per-module configuration block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    /// Unique module name; "core" is reserved.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Log directory override; the manager's `log_dir` applies otherwise.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Whether the module starts enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    // Gate seeds, lower-cased at module construction.
    #[serde(default)]
    pub allow_user: Vec<String>,
    #[serde(default)]
    pub deny_user: Vec<String>,
    #[serde(default)]
    pub allow_chan: Vec<String>,
    #[serde(default)]
    pub deny_chan: Vec<String>,
}

impl ModuleConfig {
    /// A minimal enabled module block, for embedding without a config file.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            log_dir: None,
            enabled: true,
            allow_user: Vec::new(),
            deny_user: Vec::new(),
            allow_chan: Vec::new(),
            deny_chan: Vec::new(),
        }
    }

    /// Log directory override fluently set, mostly for tests and embedders.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_port() -> u16 {
    6667
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let config: BotConfig = toml::from_str(
            r#"
            [bot]
            nick = "muxbot"

            [network]
            server = "irc.example.net"

            [[modules]]
            name = "weather"
            description = "weather lookups"
            allow_user = ["Alice"]
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.network.port, 6667);
        assert_eq!(config.log_dir, PathBuf::from("./logs"));
        assert_eq!(config.modules.len(), 1);
        assert!(config.modules[0].enabled);
        assert_eq!(config.modules[0].allow_user, vec!["Alice".to_string()]);
    }

    #[test]
    fn rejects_missing_nick() {
        let config: BotConfig = toml::from_str(
            r#"
            [bot]
            nick = ""

            [network]
            server = "irc.example.net"
            "#,
        )
        .unwrap();

        assert!(matches!(config.validate(), Err(ConfigError::Missing("bot.nick"))));
    }
}
