/// Consensus configuration
///
/// Typed config loaded from JSON and validated before use.

use crate::election::ElectionConfig;
use crate::validators::Validators;
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

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Engine actor settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the inbound event queue
    pub inbound_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inbound_capacity: 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub validators: Validators,
    #[serde(default)]
    pub election: ElectionConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ConsensusConfig {
    pub fn new(validators: Validators) -> Self {
        Self {
            validators,
            election: ElectionConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.inbound_capacity == 0 {
            return Err(ConfigError::Invalid(
                "engine.inbound_capacity must be positive".to_string(),
            ));
        }
        if let Some(max) = self.election.max_rounds {
            if max < 2 {
                return Err(ConfigError::Invalid(format!(
                    "election.max_rounds must be at least 2, got {}",
                    max
                )));
            }
        }
        if self.election.stall_warn_rounds == 0 {
            return Err(ConfigError::Invalid(
                "election.stall_warn_rounds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
