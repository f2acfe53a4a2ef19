//! Configuration for the upload mock.
//!
//! YAML files with `${VAR}` / `${VAR:-default}` environment variable
//! expansion and validation after parse. Every field has a default, so the
//! binary also runs with no file at all.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Expand environment variables in a string.
///
/// Supports `${VAR_NAME}` (placeholder kept when the variable is unset) and
/// `${VAR_NAME:-default}`. Variable names are uppercase letters, digits and
/// underscores, starting with a letter or underscore.
fn expand_env_vars(s: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}").unwrap();
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let full_match = cap.get(0).unwrap();
        let var_name = cap.get(1).unwrap().as_str();

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }
    result.push_str(&s[last_match..]);

    result
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tus: TusConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.address.is_empty() {
            return Err(ConfigError::ValidationError(
                "server.address must not be empty".into(),
            ));
        }
        if !self.tus.path_prefix.starts_with('/') {
            return Err(ConfigError::ValidationError(
                "tus.path_prefix must start with /".into(),
            ));
        }
        if self.tus.path_prefix.len() > 1 && self.tus.path_prefix.ends_with('/') {
            return Err(ConfigError::ValidationError(
                "tus.path_prefix must not end with /".into(),
            ));
        }
        if self.tus.key_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "tus.key_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, e.g. `127.0.0.1:1080`. Port 0 asks the OS for a port.
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

/// Upload endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TusConfig {
    /// URL prefix the upload routes hang off of.
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Prefix for the per-upload data and offset keys in the backing store.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Delay added to successful PATCH responses, in milliseconds.
    #[serde(default = "default_patch_delay_ms")]
    pub patch_delay_ms: u64,
}

impl Default for TusConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            key_prefix: default_key_prefix(),
            patch_delay_ms: default_patch_delay_ms(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:1080".into()
}

fn default_path_prefix() -> String {
    "/files".into()
}

fn default_key_prefix() -> String {
    "tus-mock".into()
}

fn default_patch_delay_ms() -> u64 {
    1
}
