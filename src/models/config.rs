//! Configuration models for preftune.
//!
//! Every field has a serde default, so a missing config file yields the
//! same fixed locations the pipeline has always used (`data/dataset.csv`,
//! `debug/`, `models/`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for preftune.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input dataset settings
    #[serde(default)]
    pub data: DataConfig,

    /// Debug artifact store settings
    #[serde(default)]
    pub debug: DebugConfig,

    /// Trained model output settings
    #[serde(default)]
    pub models: ModelsConfig,

    /// Base model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Training settings
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Input dataset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Path to the input CSV (columns `prompt`, `answer`)
    #[serde(default = "default_dataset")]
    pub dataset: PathBuf,
}

fn default_dataset() -> PathBuf {
    PathBuf::from("data/dataset.csv")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
        }
    }
}

/// Debug artifact store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Directory scanned for stage artifacts
    #[serde(default = "default_debug_dir")]
    pub dir: PathBuf,
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("debug")
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            dir: default_debug_dir(),
        }
    }
}

/// Trained model output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Directory that receives fine-tuned checkpoints
    #[serde(default = "default_models_dir")]
    pub dir: PathBuf,
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: default_models_dir(),
        }
    }
}

/// Base model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Identifier of the pretrained base model to fine-tune
    #[serde(default = "default_base_id")]
    pub base_id: String,

    /// Local model cache directory holding `<base_id>/config.json`,
    /// `tokenizer.json` and optional `model.safetensors`
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_base_id() -> String {
    "gpt2-tiny".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("models/base")
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_id: default_base_id(),
            cache_dir: default_cache_dir(),
        }
    }
}

/// Training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Fixed learning rate for the optimizer
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Token sequences longer than this are truncated before the loss
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
}

fn default_learning_rate() -> f64 {
    1e-5
}

fn default_max_seq_len() -> usize {
    256
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            max_seq_len: default_max_seq_len(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_matches_fixed_locations() {
        let config = Config::default();
        assert_eq!(config.data.dataset, PathBuf::from("data/dataset.csv"));
        assert_eq!(config.debug.dir, PathBuf::from("debug"));
        assert_eq!(config.models.dir, PathBuf::from("models"));
        assert_eq!(config.model.base_id, "gpt2-tiny");
        assert!((config.training.learning_rate - 1e-5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preftune.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[training]\nlearning_rate = 0.001").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!((config.training.learning_rate - 0.001).abs() < f64::EPSILON);
        assert_eq!(config.training.max_seq_len, 256);
        assert_eq!(config.debug.dir, PathBuf::from("debug"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load_or_default(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(config.model.base_id, "gpt2-tiny");
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preftune.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
