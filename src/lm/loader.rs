//! Base model resolution from the local model cache.
//!
//! A base model identifier names a directory under the cache holding
//! `config.json` and `tokenizer.json`, with an optional `model.safetensors`
//! to warm-start the parameters. Nothing here touches the network.

use crate::lm::tiny::{TinyCausalLm, TinyLmConfig};
use crate::lm::tokenizer::LmTokenizer;
use crate::models::{PreftuneError, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Base model used when the configuration names none.
pub const DEFAULT_BASE_MODEL: &str = "gpt2-tiny";

/// Resolves base model identifiers inside a local cache directory.
#[derive(Debug, Clone)]
pub struct ModelLoader {
    cache_dir: PathBuf,
}

impl ModelLoader {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Resolve and load `base_model_id`.
    pub fn load(&self, base_model_id: &str, learning_rate: f64) -> Result<TinyCausalLm> {
        let dir = self.cache_dir.join(base_model_id);
        if !dir.is_dir() {
            return Err(PreftuneError::model_load(format!(
                "base model '{base_model_id}' not found under {}",
                self.cache_dir.display()
            )));
        }

        let config_path = dir.join("config.json");
        let raw = fs::read_to_string(&config_path).map_err(|e| {
            PreftuneError::model_load(format!("reading {}: {e}", config_path.display()))
        })?;
        let config: TinyLmConfig = serde_json::from_str(&raw).map_err(|e| {
            PreftuneError::model_load(format!("parsing {}: {e}", config_path.display()))
        })?;

        let tokenizer = LmTokenizer::from_file(&dir.join("tokenizer.json"))?;

        let weights = dir.join("model.safetensors");
        let weights = weights.exists().then_some(weights);
        if weights.is_some() {
            info!(model = base_model_id, "Warm-starting from cached weights");
        }

        TinyCausalLm::new(
            base_model_id,
            config,
            tokenizer,
            weights.as_deref(),
            learning_rate,
        )
    }
}
