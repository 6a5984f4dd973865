//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::database::{DEFAULT_MAX_CONNECTIONS, DatabaseConfig, default_database_path};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "FACETGRAPH_CONFIG_DIR";

/// Facetgraph configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "facetgraph=info".to_string(),
        }
    }
}

impl StorageConfig {
    /// Database settings for this storage section
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::with_path(&self.path).max_connections(self.max_connections)
    }
}

const KEYS: &[&str] = &["storage.path", "storage.max_connections", "logging.filter"];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("facetgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the config file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file, or defaults if it doesn't exist
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            // Return default config without creating file
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the config file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Overwrite the config file with defaults
    pub fn reset() -> anyhow::Result<()> {
        Config::default().save()
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.max_connections == 0 {
            return Err(anyhow!("storage.max_connections must be at least 1"));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(anyhow!("logging.filter must not be empty"));
        }
        Ok(())
    }

    /// Known configuration keys
    pub fn keys() -> &'static [&'static str] {
        KEYS
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "storage.path" => Ok(self.storage.path.display().to_string()),
            "storage.max_connections" => Ok(self.storage.max_connections.to_string()),
            "logging.filter" => Ok(self.logging.filter.clone()),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `facetgraph config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "storage.path" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("storage.path must not be empty"));
                }
                self.storage.path = PathBuf::from(value);
            }
            "storage.max_connections" => {
                let max: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("storage.max_connections must be at least 1"));
                }
                self.storage.max_connections = max;
            }
            "logging.filter" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("logging.filter must not be empty"));
                }
                self.logging.filter = value.to_string();
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `facetgraph config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| Ok((key.to_string(), self.get(key)?)))
            .collect()
    }
}
