use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Default number of distinct entities buffered before a forced flush.
pub const DEFAULT_TRANSACTION_WINDOW: usize = 1000;

/// Tunables for a [`Session`](crate::Session).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Maximum number of distinct pending entities. Saving one more than
    /// this triggers a flush.
    pub transaction_window: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            transaction_window: DEFAULT_TRANSACTION_WINDOW,
        }
    }
}

impl ModelConfig {
    pub fn with_window(transaction_window: usize) -> ModelResult<Self> {
        let config = Self { transaction_window };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.transaction_window == 0 {
            return Err(ModelError::Config(
                "transaction_window must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Parse a TOML document such as `transaction_window = 500`.
    pub fn from_toml_str(s: &str) -> ModelResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ModelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ModelError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }
}
