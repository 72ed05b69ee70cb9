use crate::engine::EngineKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "TWOWAY_CONFIG";

/// Named folder pairs with their sync settings
///
/// ```toml
/// [profiles.books]
/// source = "/mnt/storage1/books"
/// destination = "/mnt/storage2/books"
/// exclude = ["*.tmp"]
/// ```
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

/// One profile; every field is optional and CLI arguments take precedence
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Profile {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub dry_run: Option<bool>,
    pub engine: Option<EngineKind>,
    pub rsync_path: Option<PathBuf>,
    pub exclude: Option<Vec<String>>,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    /// Config file path: `$TWOWAY_CONFIG`, else `<config dir>/twoway/config.toml`
    pub fn config_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        let dir = dirs::config_dir().context("Config directory not found")?;
        Ok(dir.join("twoway").join("config.toml"))
    }

    /// Load the config file; a missing file is an empty config
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn list_profiles(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn get_profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Profile rendered as TOML for `--show-profile`
    pub fn show_profile(&self, name: &str) -> Option<String> {
        let profile = self.get_profile(name)?;
        let body = toml::to_string_pretty(profile).ok()?;
        Some(format!("[profiles.{}]\n{}", name, body))
    }
}
