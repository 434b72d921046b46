/// Load generator configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Range of generated accounts: global indices `offset..offset + count`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsConfig {
    pub count: u32,
    #[serde(default)]
    pub offset: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TxStormConfig {
    pub chain_id: u64,
    pub accounts: AccountsConfig,
    /// Target transactions per second; fractional rates are rounded up
    #[serde(default)]
    pub tps: f64,
    /// Capacity of the output channel
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

fn default_buffer() -> usize {
    100
}

impl TxStormConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.count < 2 {
            return Err(ConfigError::Invalid(format!(
                "accounts.count must be at least 2, got {}",
                self.accounts.count
            )));
        }
        if self.accounts.offset.checked_add(self.accounts.count).is_none() {
            return Err(ConfigError::Invalid("account range overflows".to_string()));
        }
        if self.buffer == 0 {
            return Err(ConfigError::Invalid("buffer must be positive".to_string()));
        }
        if !self.tps.is_finite() || self.tps < 0.0 {
            return Err(ConfigError::Invalid(format!("invalid tps {}", self.tps)));
        }
        Ok(())
    }
}
