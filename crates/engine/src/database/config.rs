//! Engine configuration via `entkit.toml`
//!
//! Every section and field is optional; missing values take their defaults,
//! so an empty file is a valid configuration.

use super::transactions::RetryConfig;
use entkit_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "entkit.toml";

/// Background job settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Number of worker threads running relation refresh jobs
    pub workers: usize,
    /// Jobs allowed to wait in the queue before submissions are rejected
    pub max_queue_depth: usize,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            max_queue_depth: 1024,
        }
    }
}

/// Engine configuration.
///
/// # Example
///
/// ```toml
/// [retry]
/// max_retries = 10
/// base_delay_ms = 1
/// max_delay_ms = 50
///
/// [background]
/// workers = 1
/// max_queue_depth = 1024
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Conflict retry policy used by `Database::run_in_transaction`
    pub retry: RetryConfig,
    /// Background scheduler sizing
    pub background: BackgroundConfig,
}

impl EngineConfig {
    /// Default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# entkit engine configuration

# Conflict retry policy for run_in_transaction.
# Delay doubles per retry, starting at base_delay_ms, capped at max_delay_ms.
[retry]
max_retries = 10
base_delay_ms = 1
max_delay_ms = 50

# Workers for asynchronous relation refresh jobs.
# Submissions beyond max_queue_depth are rejected and reported as diagnostics.
[background]
workers = 1
max_queue_depth = 1024
"#
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::invalid_argument(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::internal(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::InvalidArgument(msg) => {
                Error::InvalidArgument(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::internal(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to `path`.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::internal(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.background.workers == 0 {
            return Err(Error::invalid_argument(
                "background.workers must be at least 1",
            ));
        }
        if self.background.max_queue_depth == 0 {
            return Err(Error::invalid_argument(
                "background.max_queue_depth must be at least 1",
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::invalid_argument(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }
}
