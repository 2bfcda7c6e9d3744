//! Configuration loader

use crate::config::AppConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Configuration file name looked up in the user's config directory
pub const DEFAULT_CONFIG_FILE: &str = "certflow.toml";

/// Configuration loader for various formats
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config = match ext {
            "json" => Self::from_json(&content),
            "toml" | "" => Self::from_toml(&content),
            _ => Err(Error::Config(format!("Unknown config format: {}", ext))),
        }?;

        config.validate()?;
        tracing::debug!(
            "📄 Loaded {:?}: {} account(s), {} cert(s)",
            path,
            config.accounts.len(),
            config.certs.len()
        );
        Ok(config)
    }

    /// `<config dir>/certflow/certflow.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("certflow").join(DEFAULT_CONFIG_FILE))
    }

    /// Parse JSON configuration
    pub fn from_json(content: &str) -> Result<AppConfig> {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid JSON: {}", e)))
    }

    /// Parse TOML configuration
    pub fn from_toml(content: &str) -> Result<AppConfig> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }
}
