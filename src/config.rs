use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::fatigue::FatigueConfig;
use crate::logging::LogConfig;
use crate::predictor::PredictorConfig;
use crate::training::TrainingConfig;
use crate::training_load::TrainingLoadConfig;

/// Engine configuration, one section per component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global model artifact settings
    pub model: ModelSettings,

    /// Acute:chronic workload settings
    pub load: TrainingLoadConfig,

    pub fatigue: FatigueConfig,

    /// Ensemble weights and heuristic constants
    pub predictor: PredictorConfig,

    /// Offline training pipeline
    pub training: TrainingConfig,

    pub logging: LogConfig,
}

/// Where the global model lives and when it is loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Artifact read by predictions and written by training
    pub artifact_path: PathBuf,

    /// Defer loading to the first prediction instead of engine construction
    pub lazy_load: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            artifact_path: PathBuf::from("models").join("global_race_model.bin"),
            lazy_load: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML configuration: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".runsight")
            .join("config.toml")
    }

    /// Load the default config file, falling back to defaults when it is absent
    /// or unreadable
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();
        if !config_path.is_file() {
            return Self::default();
        }

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "Ignoring unreadable config file");
                Self::default()
            }
        }
    }
}
