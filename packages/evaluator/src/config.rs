use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_NAME: &str = "idyll.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("nodeTimeoutMs must be greater than zero")]
    ZeroTimeout,
}

/// Executor configuration file format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// Per-node execution budget in milliseconds
    #[serde(default = "default_node_timeout_ms")]
    pub node_timeout_ms: u64,

    /// End the run at the first failed node
    #[serde(default)]
    pub stop_on_error: bool,

    /// Substitute resolved variables into instructions before calling functions
    #[serde(default = "default_interpolate_variables")]
    pub interpolate_variables: bool,
}

fn default_node_timeout_ms() -> u64 {
    30_000
}

fn default_interpolate_variables() -> bool {
    true
}

impl ExecutorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ExecutorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_json(&content)
        } else {
            Ok(ExecutorConfig::default())
        }
    }

    /// Load `idyll.config.json` from a directory
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(dir.as_ref().join(DEFAULT_CONFIG_NAME))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    pub fn with_node_timeout_ms(mut self, node_timeout_ms: u64) -> Self {
        self.node_timeout_ms = node_timeout_ms;
        self
    }

    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }

    pub fn with_interpolate_variables(mut self, interpolate_variables: bool) -> Self {
        self.interpolate_variables = interpolate_variables;
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            node_timeout_ms: default_node_timeout_ms(),
            stop_on_error: false,
            interpolate_variables: default_interpolate_variables(),
        }
    }
}
