use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What the screen host shows when a navigation cannot be honored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Always fall back to the configured default route
    #[default]
    DefaultRoute,

    /// Retry the last destination that attached successfully, then the default route
    LastKnownGood,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_route")]
    pub default_route: String,

    #[serde(default)]
    pub fallback: FallbackPolicy,

    /// Maximum history entries kept per identity (0 = unbounded)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_route() -> String {
    "home".to_string()
}

fn default_history_limit() -> usize {
    64
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            default_route: default_route(),
            fallback: FallbackPolicy::default(),
            history_limit: default_history_limit(),
        }
    }
}

impl HostConfig {
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "linux") {
            // Use XDG config directory on Linux
            dirs::config_dir()
                .context("Failed to get XDG config directory")?
                .join("wayfinder")
        } else {
            // Use home directory with dot prefix on Windows/Mac
            dirs::home_dir()
                .context("Failed to get home directory")?
                .join(".wayfinder")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            info!("Config file {:?} doesn't exist, using defaults", config_path);
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from: {:?}", path);

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: HostConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {:?}", dir))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        info!("Config saved to: {:?}", path);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.default_route.trim_matches('/').is_empty() {
            anyhow::bail!("default_route must not be empty");
        }
        Ok(())
    }

    /// History capacity as an option (`None` = unbounded)
    pub fn history_capacity(&self) -> Option<usize> {
        (self.history_limit > 0).then_some(self.history_limit)
    }
}
