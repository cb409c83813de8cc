//! Configuration management with environment variable support.
//!
//! This module provides [`Config`] for loading and validating ofencrypt settings
//! from JSON files and environment variables.
//!
//! ## Environment Variables
//!
//! - `OFENCRYPT_EXTENSION`: Override the container file extension
//! - `OFENCRYPT_CHUNK_SIZE`: Override the streaming chunk size in bytes
//! - `OFENCRYPT_KEY_FILE`: Default file to read the password from
//! - `OFENCRYPT_CONFIG`: Override config file path

use crate::cipher::{BLOCK_SIZE, DEFAULT_CHUNK_SIZE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable names for configuration overrides
pub const ENV_EXTENSION: &str = "OFENCRYPT_EXTENSION";
pub const ENV_CHUNK_SIZE: &str = "OFENCRYPT_CHUNK_SIZE";
pub const ENV_KEY_FILE: &str = "OFENCRYPT_KEY_FILE";
pub const ENV_CONFIG_PATH: &str = "OFENCRYPT_CONFIG";

/// Suffix given to every container file
pub const DEFAULT_EXTENSION: &str = "encrypted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub extension: String,
    pub chunk_size: usize,
    pub key_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            key_file: None,
        }
    }
}

impl Config {
    /// Load config from file path
    pub fn load(path: &str) -> Result<Self> {
        let s =
            fs::read_to_string(path).with_context(|| format!("reading config file {}", path))?;
        let mut config: Config = serde_json::from_str(&s)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config with environment variable overrides
    /// Priority: ENV vars > config file > defaults
    pub fn load_with_env(path: Option<&str>) -> Result<Self> {
        let config_path = path
            .map(String::from)
            .or_else(|| env::var(ENV_CONFIG_PATH).ok());

        let mut config = match config_path {
            Some(ref p) if Path::new(p).exists() => {
                info!(path = p, "loading config from file");
                let s = fs::read_to_string(p)
                    .with_context(|| format!("reading config file {}", p))?;
                serde_json::from_str(&s).with_context(|| format!("parsing config file {}", p))?
            }
            Some(ref p) => {
                warn!(path = p, "config file not found, using defaults");
                Config::default()
            }
            None => {
                debug!("using default configuration");
                Config::default()
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(extension) = env::var(ENV_EXTENSION) {
            debug!(extension = %extension, "overriding extension from environment");
            self.extension = extension;
        }

        if let Ok(chunk_size) = env::var(ENV_CHUNK_SIZE) {
            debug!(chunk_size = %chunk_size, "overriding chunk_size from environment");
            self.chunk_size = chunk_size
                .trim()
                .parse()
                .with_context(|| format!("{} must be an integer, got {:?}", ENV_CHUNK_SIZE, chunk_size))?;
        }

        if let Ok(key_file) = env::var(ENV_KEY_FILE) {
            debug!(key_file = %key_file, "overriding key_file from environment");
            self.key_file = Some(key_file);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let ext = self.extension.trim();
        if ext.is_empty() {
            anyhow::bail!("extension cannot be empty");
        }
        if ext.contains('.') || ext.contains('/') || ext.contains('\\') {
            anyhow::bail!("extension must be a bare suffix without dots or separators, got {:?}", ext);
        }

        if self.chunk_size == 0 || self.chunk_size % BLOCK_SIZE != 0 {
            anyhow::bail!(
                "chunk_size must be a non-zero multiple of {} bytes, got {}",
                BLOCK_SIZE,
                self.chunk_size
            );
        }

        if let Some(key_file) = &self.key_file {
            if key_file.trim().is_empty() {
                anyhow::bail!("key_file cannot be empty when set");
            }
            let parent_str = Path::new(key_file)
                .parent()
                .map(|p| p.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if parent_str.contains("public") || parent_str.contains("www") {
                warn!(path = %key_file, "key file path appears to be in a public directory");
            }
        }

        Ok(())
    }

    /// Create a new config with an explicit extension and chunk size
    pub fn new(extension: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            extension: extension.into(),
            chunk_size,
            key_file: None,
        }
    }
}
