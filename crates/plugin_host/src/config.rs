//! Plugin host configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PluginError, Result};
use crate::paths::clean_path;

fn default_enabled() -> bool {
    true
}

fn default_directory() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_autoload() -> bool {
    true
}

/// Plugin loading configuration, usually the `[plugins]` table of the
/// server's TOML config.
///
/// ```toml
/// enabled = true
/// directory = "plugins"
/// data_directory = "plugin-data"   # defaults to <directory>/data
/// autoload = true                  # load every module found in directory
/// files = ["extra/greeter.so"]     # relative to directory unless absolute
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Master switch for plugin support
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Directory holding plugin modules
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Root of the per-plugin data directories
    #[serde(default)]
    pub data_directory: Option<PathBuf>,
    /// Whether to load every module found in `directory` on startup
    #[serde(default = "default_autoload")]
    pub autoload: bool,
    /// Modules to load in addition to (or instead of) the autoloaded ones
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            directory: default_directory(),
            data_directory: None,
            autoload: default_autoload(),
            files: Vec::new(),
        }
    }
}

impl PluginSettings {
    /// Directory under which every plugin gets its own data directory.
    pub fn data_root(&self) -> PathBuf {
        match &self.data_directory {
            Some(dir) => dir.clone(),
            None => self.directory.join("data"),
        }
    }

    /// Resolves a module path: relative paths are taken from `directory`.
    /// The result is lexically cleaned but not canonicalized.
    pub fn resolve_module(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            clean_path(path)
        } else {
            clean_path(&self.directory.join(path))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(PluginError::Config("plugin directory cannot be empty".to_string()));
        }
        if let Some(dir) = &self.data_directory {
            if dir.as_os_str().is_empty() {
                return Err(PluginError::Config(
                    "plugin data directory cannot be empty when set".to_string(),
                ));
            }
        }
        if let Some(file) = self.files.iter().find(|f| f.file_stem().is_none()) {
            return Err(PluginError::Config(format!(
                "plugin file entry has no file name: {:?}",
                file
            )));
        }
        Ok(())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: PluginSettings =
            toml::from_str(content).map_err(|e| PluginError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads settings from a TOML file. A missing file yields the defaults.
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "No plugin config file, using defaults");
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&content)
    }
}
