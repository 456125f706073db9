//! Configuration of the standalone plugin host.
//!
//! Loaded from a TOML file; command-line options are applied on top.

use std::net::SocketAddr;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use plugin_host::{PluginSettings, ServerInfo};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cli::CliArgs;

fn default_max_players() -> usize {
    100
}

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    #[serde(default)]
    pub plugins: PluginSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// What the host reports about itself to plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Display name of the server
    pub name: String,
    /// Message of the day
    #[serde(default)]
    pub motd: String,
    /// Advertised listen address, e.g. "127.0.0.1:25565"
    #[serde(default)]
    pub bind_address: Option<String>,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    /// Worlds created at startup
    #[serde(default)]
    pub worlds: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                name: "Horizon".to_string(),
                motd: "A Horizon server".to_string(),
                bind_address: Some("127.0.0.1:25565".to_string()),
                max_players: default_max_players(),
                worlds: vec!["overworld".to_string()],
            },
            plugins: PluginSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written to
    /// `path` and the defaults are returned.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await? {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig =
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let config = AppConfig::default();
            let content = toml::to_string_pretty(&config)?;
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(config)
        }
    }

    /// Applies command-line overrides.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(dir) = &args.plugin_dir {
            self.plugins.directory = dir.clone();
        }
        if let Some(dir) = &args.data_dir {
            self.plugins.data_directory = Some(dir.clone());
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.name.trim().is_empty() {
            bail!("Server name cannot be empty");
        }
        if let Some(addr) = &self.server.bind_address {
            if addr.parse::<SocketAddr>().is_err() {
                bail!("Invalid bind address: {}", addr);
            }
        }
        if self.server.max_players == 0 {
            bail!("max_players must be at least 1");
        }

        self.plugins.validate()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }
        Ok(())
    }

    /// Server description handed to plugins.
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.server.name.clone(),
            motd: self.server.motd.clone(),
            listen_addr: self.server.bind_address.as_deref().and_then(|a| a.parse().ok()),
            max_players: self.server.max_players,
            started_at: SystemTime::now(),
        }
    }
}
