//! Tokenizer wrapper over a HuggingFace `tokenizer.json`.

use crate::models::{PreftuneError, Result};
use std::path::Path;

/// Tokenizer for the bundled causal LM.
#[derive(Debug)]
pub struct LmTokenizer {
    inner: tokenizers::Tokenizer,
    vocab_size: usize,
}

impl LmTokenizer {
    /// Load from a local tokenizer.json file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            PreftuneError::model_load(format!("loading tokenizer {}: {e}", path.display()))
        })?;
        let vocab_size = inner.get_vocab_size(true);
        Ok(Self { inner, vocab_size })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Encode text to token IDs, without special tokens.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| PreftuneError::training(format!("encoding text: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }
}
