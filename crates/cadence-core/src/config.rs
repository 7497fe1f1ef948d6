//! Engine configuration.
//!
//! ```toml
//! scan_interval_secs = 60
//! utc_offset_minutes = 540   # local day used by midnight triggers
//! max_parallel_tasks = 16
//! ```

use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::domain::errors::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub scan_interval_secs: u64,
    pub utc_offset_minutes: i32,
    pub max_parallel_tasks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: 60,
            utc_offset_minutes: 0,
            max_parallel_tasks: 16,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.utc_offset()?;
        if self.scan_interval_secs == 0 {
            return Err(ConfigError::Parse("scan_interval_secs must be positive".into()));
        }
        if self.max_parallel_tasks == 0 {
            return Err(ConfigError::Parse("max_parallel_tasks must be positive".into()));
        }
        Ok(())
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or(ConfigError::InvalidUtcOffset(self.utc_offset_minutes))
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}
