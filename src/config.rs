//! Bridge configuration
//!
//! Loaded from a TOML file located at
//! `<cwd>/$CONFIGURATION_PATH/$CONFIG_FILE_NAME` (defaults: no sub-path,
//! `config.toml`). Every section is optional except `[broker]`, which must
//! name the exchange.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::broker::BrokerConfig;
use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use crate::pool::PoolConfig;
use crate::server::ServerConfig;

/// Environment variable holding the config directory, relative to the cwd
pub const CONFIG_PATH_ENV: &str = "CONFIGURATION_PATH";

/// Environment variable holding the config file name
pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE_NAME";

/// Config file name used when [`CONFIG_FILE_ENV`] is unset
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Complete bridge configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub pool: PoolConfig,
    pub logging: LoggingConfig,
}

impl BridgeConfig {
    /// Resolve the config file location from the environment
    pub fn path_from_env() -> Result<PathBuf> {
        let sub_path = env::var(CONFIG_PATH_ENV).unwrap_or_default();
        let file_name =
            env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let mut path = env::current_dir()?;
        let sub_path = sub_path.trim_start_matches('/');
        if !sub_path.is_empty() {
            path.push(sub_path);
        }
        path.push(file_name);
        Ok(path)
    }

    /// Load the config file found via [`path_from_env`](Self::path_from_env)
    pub fn from_env() -> Result<Self> {
        Self::load(&Self::path_from_env()?)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file is missing: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML content
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BridgeConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.broker.url.is_empty() {
            return Err(Error::Config("broker.url must not be empty".into()));
        }
        if self.broker.exchange.is_empty() {
            return Err(Error::Config("broker.exchange must not be empty".into()));
        }
        if self.pool.heartbeat_interval.is_zero() || self.pool.stats_interval.is_zero() {
            return Err(Error::Config("pool intervals must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Serde helper reading a `Duration` from whole seconds
pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
