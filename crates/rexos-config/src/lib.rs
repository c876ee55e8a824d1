//! Configuration management for the RexOS game catalog
//!
//! Handles the games folder layout, search index settings and the system
//! registry. TOML-based config files, following the ArkOS layout of a user
//! override on the ROMs partition and a system default under /etc.

mod catalog_config;
mod systems;

pub use catalog_config::{GamelistConfig, IndexConfig, IndexGeneration};
pub use systems::{System, SystemRegistry};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown system: {0}")]
    UnknownSystem(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Standard configuration paths
pub const CONFIG_DIR: &str = "/etc/rexos";
pub const USER_CONFIG_DIR: &str = "/roms/.rexos";

/// Catalog configuration file name
pub const CONFIG_FILE: &str = "catalog.toml";

/// Game catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Roots searched, in order, for system folders
    #[serde(default = "default_games_folders")]
    pub games_folders: Vec<PathBuf>,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub gamelists: GamelistConfig,

    /// Extra systems added to (or overriding) the built-in registry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub systems: Vec<System>,
}

fn default_games_folders() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/roms"),
        PathBuf::from("/roms2"),
        PathBuf::from("/media/usb0"),
    ]
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            games_folders: default_games_folders(),
            index: IndexConfig::default(),
            gamelists: GamelistConfig::default(),
            systems: Vec::new(),
        }
    }
}

impl CatalogConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        // Try user config first, then system config
        let user_config = Path::new(USER_CONFIG_DIR).join(CONFIG_FILE);
        if user_config.exists() {
            return Self::load(&user_config);
        }

        let system_config = Path::new(CONFIG_DIR).join(CONFIG_FILE);
        if system_config.exists() {
            return Self::load(&system_config);
        }

        tracing::warn!("No catalog configuration found, using defaults");
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Built-in systems merged with the configured extras
    pub fn registry(&self) -> SystemRegistry {
        let mut registry = SystemRegistry::builtin();
        registry.extend(self.systems.iter().cloned());
        registry
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for system in &self.systems {
            if system.id.is_empty() || system.id.contains(':') {
                return Err(ConfigError::Invalid(format!(
                    "system id {:?} must be non-empty and must not contain ':'",
                    system.id
                )));
            }
        }
        Ok(())
    }
}
