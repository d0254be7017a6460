use std::path::{Path, PathBuf};

use anyhow::Context;
use gitgraph_model::ModelConfig;
use serde::Deserialize;

const DEFAULT_DATA: &str = "gitgraph.json";

/// Settings read from the `--config` file.
///
/// ```toml
/// data = "/var/lib/gitgraph/index.json"
///
/// [model]
/// transaction_window = 500
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub data: PathBuf,
    pub model: ModelConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data: PathBuf::from(DEFAULT_DATA),
            model: ModelConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load `file` if given, then apply the `--data` override.
    pub fn resolve(file: Option<&Path>, data: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = match file {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str::<CliConfig>(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => CliConfig::default(),
        };
        config.model.validate()?;
        if let Some(data) = data {
            config.data = data;
        }
        Ok(config)
    }
}
