//! Bundled causal language model: a small decoder-only transformer.
//!
//! Embedding -> transformer blocks -> weight-tied LM head, trained with
//! AdamW on the next-token cross-entropy. The pipeline only sees this
//! through [`PolicyModel`]; swapping in a different architecture touches
//! nothing else.

use crate::lm::policy::PolicyModel;
use crate::lm::tokenizer::LmTokenizer;
use crate::models::{PreftuneError, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{layer_norm, linear, AdamW, Embedding, LayerNorm, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Architecture hyperparameters, read from the base model's `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TinyLmConfig {
    pub vocab_size: usize,
    pub dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub max_seq_len: usize,
}

impl Default for TinyLmConfig {
    fn default() -> Self {
        Self {
            vocab_size: 256,
            dim: 64,
            n_layers: 2,
            n_heads: 4,
            max_seq_len: 128,
        }
    }
}

/// Metadata stored alongside checkpoint weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub base_model: String,
    pub config: TinyLmConfig,
    pub saved_at: DateTime<Utc>,
}

fn num_err(context: &str, e: candle_core::Error) -> PreftuneError {
    PreftuneError::training(format!("{context}: {e}"))
}

fn build_err(e: candle_core::Error) -> PreftuneError {
    PreftuneError::model_load(format!("building model graph: {e}"))
}

/// Causal attention mask: upper triangle filled with -inf.
fn causal_mask(seq_len: usize, device: &Device) -> candle_core::Result<Tensor> {
    let mut data = vec![0.0f32; seq_len * seq_len];
    for i in 0..seq_len {
        for j in (i + 1)..seq_len {
            data[i * seq_len + j] = f32::NEG_INFINITY;
        }
    }
    Tensor::from_vec(data, (seq_len, seq_len), device)
}

struct CausalSelfAttention {
    wq: Linear,
    wk: Linear,
    wv: Linear,
    wo: Linear,
    n_heads: usize,
    head_dim: usize,
}

impl CausalSelfAttention {
    fn new(dim: usize, n_heads: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let head_dim = dim / n_heads;
        let wq = linear(dim, dim, vb.pp("wq"))?;
        let wk = linear(dim, dim, vb.pp("wk"))?;
        let wv = linear(dim, dim, vb.pp("wv"))?;
        let wo = linear(dim, dim, vb.pp("wo"))?;
        Ok(Self {
            wq,
            wk,
            wv,
            wo,
            n_heads,
            head_dim,
        })
    }

    /// x: [batch, seq, dim] -> [batch, seq, dim]
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let (b, t, _dim) = x.dims3()?;

        let q = self
            .wq
            .forward(x)?
            .reshape((b, t, self.n_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let k = self
            .wk
            .forward(x)?
            .reshape((b, t, self.n_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;
        let v = self
            .wv
            .forward(x)?
            .reshape((b, t, self.n_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?;

        let scale = (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.transpose(D::Minus2, D::Minus1)?.contiguous()?)? / scale)?;

        let mask = causal_mask(t, scores.device())?;
        let scores = scores.broadcast_add(&mask)?;

        let weights = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let out = weights.matmul(&v)?; // [batch, heads, seq, head_dim]

        let out = out
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, t, self.n_heads * self.head_dim))?;
        self.wo.forward(&out)
    }
}

struct Mlp {
    fc1: Linear,
    fc2: Linear,
}

impl Mlp {
    fn new(dim: usize, vb: VarBuilder) -> candle_core::Result<Self> {
        let fc1 = linear(dim, 4 * dim, vb.pp("fc1"))?;
        let fc2 = linear(4 * dim, dim, vb.pp("fc2"))?;
        Ok(Self { fc1, fc2 })
    }

    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        self.fc2.forward(&self.fc1.forward(x)?.gelu()?)
    }
}

struct Block {
    ln1: LayerNorm,
    attn: CausalSelfAttention,
    ln2: LayerNorm,
    mlp: Mlp,
}

impl Block {
    fn new(config: &TinyLmConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let ln1 = layer_norm(config.dim, 1e-5, vb.pp("ln1"))?;
        let attn = CausalSelfAttention::new(config.dim, config.n_heads, vb.pp("attn"))?;
        let ln2 = layer_norm(config.dim, 1e-5, vb.pp("ln2"))?;
        let mlp = Mlp::new(config.dim, vb.pp("mlp"))?;
        Ok(Self {
            ln1,
            attn,
            ln2,
            mlp,
        })
    }

    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let x = (x + self.attn.forward(&self.ln1.forward(x)?)?)?;
        let x = (&x + self.mlp.forward(&self.ln2.forward(&x)?)?)?;
        Ok(x)
    }
}

/// Small decoder-only causal LM backed by a [`VarMap`].
pub struct TinyCausalLm {
    base_id: String,
    config: TinyLmConfig,
    tokenizer: LmTokenizer,
    varmap: VarMap,
    tok_embed: Embedding,
    pos_embed: Embedding,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    optimizer: AdamW,
    device: Device,
    pending: Option<Tensor>,
}

impl std::fmt::Debug for TinyCausalLm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TinyCausalLm")
            .field("base_id", &self.base_id)
            .field("config", &self.config)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl TinyCausalLm {
    /// Build the model graph, optionally warm-starting from safetensors
    /// weights saved by an earlier run.
    pub fn new(
        base_id: &str,
        config: TinyLmConfig,
        tokenizer: LmTokenizer,
        weights: Option<&Path>,
        learning_rate: f64,
    ) -> Result<Self> {
        if config.n_heads == 0 || config.dim % config.n_heads != 0 {
            return Err(PreftuneError::model_load(format!(
                "dim {} not divisible by n_heads {}",
                config.dim, config.n_heads
            )));
        }
        if config.vocab_size < tokenizer.vocab_size() {
            return Err(PreftuneError::model_load(format!(
                "config vocab_size {} smaller than tokenizer vocab {}",
                config.vocab_size,
                tokenizer.vocab_size()
            )));
        }

        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        // candle_nn::embedding defaults to Randn with stdev 1.0, far too
        // hot for a weight-tied head; GPT-2 initializes at N(0, 0.02).
        let init = candle_nn::Init::Randn {
            mean: 0.0,
            stdev: 0.02,
        };
        let tok_weights = vb
            .pp("tok_embed")
            .get_with_hints((config.vocab_size, config.dim), "weight", init)
            .map_err(build_err)?;
        let tok_embed = Embedding::new(tok_weights, config.dim);

        let pos_weights = vb
            .pp("pos_embed")
            .get_with_hints((config.max_seq_len, config.dim), "weight", init)
            .map_err(build_err)?;
        let pos_embed = Embedding::new(pos_weights, config.dim);

        let blocks = (0..config.n_layers)
            .map(|i| Block::new(&config, vb.pp(format!("blocks.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()
            .map_err(build_err)?;
        let ln_f = layer_norm(config.dim, 1e-5, vb.pp("ln_f")).map_err(build_err)?;

        if let Some(path) = weights {
            varmap.load(path).map_err(|e| {
                PreftuneError::model_load(format!("loading weights {}: {e}", path.display()))
            })?;
        }

        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: learning_rate,
                ..Default::default()
            },
        )
        .map_err(build_err)?;

        Ok(Self {
            base_id: base_id.to_string(),
            config,
            tokenizer,
            varmap,
            tok_embed,
            pos_embed,
            blocks,
            ln_f,
            optimizer,
            device,
            pending: None,
        })
    }

    pub fn config(&self) -> &TinyLmConfig {
        &self.config
    }

    /// token_ids: [batch, seq] -> logits [batch, seq, vocab]
    fn forward(&self, token_ids: &Tensor) -> candle_core::Result<Tensor> {
        let (_b, t) = token_ids.dims2()?;
        let positions = Tensor::arange(0u32, t as u32, &self.device)?;
        let mut x = self
            .tok_embed
            .forward(token_ids)?
            .broadcast_add(&self.pos_embed.forward(&positions)?)?;
        for block in &self.blocks {
            x = block.forward(&x)?;
        }
        let x = self.ln_f.forward(&x)?;

        // Weight-tied head: project back through the token embedding.
        let lm_w = self.tok_embed.embeddings().t()?;
        let (b, t, d) = x.dims3()?;
        x.reshape((b * t, d))?
            .matmul(&lm_w)?
            .reshape((b, t, self.config.vocab_size))
    }
}

impl PolicyModel for TinyCausalLm {
    fn base_id(&self) -> &str {
        &self.base_id
    }

    fn compute_loss(&mut self, text: &str) -> Result<f64> {
        let mut ids = self.tokenizer.encode(text)?;
        ids.truncate(self.config.max_seq_len);
        if ids.len() < 2 {
            return Err(PreftuneError::training(
                "text yields fewer than two tokens, no next-token target",
            ));
        }

        let n = ids.len();
        let input = Tensor::from_vec(ids[..n - 1].to_vec(), (1, n - 1), &self.device)
            .map_err(|e| num_err("building input tensor", e))?;
        let target = Tensor::from_vec(ids[1..].to_vec(), (1, n - 1), &self.device)
            .map_err(|e| num_err("building target tensor", e))?;

        let logits = self
            .forward(&input)
            .map_err(|e| num_err("forward pass", e))?;
        let (b, t, _vocab) = logits.dims3().map_err(|e| num_err("forward pass", e))?;
        let logits_flat = logits
            .reshape((b * t, self.config.vocab_size))
            .map_err(|e| num_err("reshaping logits", e))?;
        let targets_flat = target
            .flatten_all()
            .map_err(|e| num_err("reshaping targets", e))?;

        let loss = candle_nn::loss::cross_entropy(&logits_flat, &targets_flat)
            .map_err(|e| num_err("computing cross-entropy", e))?;
        let value = f64::from(
            loss.to_scalar::<f32>()
                .map_err(|e| num_err("extracting loss value", e))?,
        );
        self.pending = Some(loss);
        Ok(value)
    }

    fn step(&mut self) -> Result<()> {
        let loss = self
            .pending
            .take()
            .ok_or_else(|| PreftuneError::training("step called with no pending loss"))?;
        self.optimizer
            .backward_step(&loss)
            .map_err(|e| num_err("applying gradient step", e))
    }

    fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| {
            PreftuneError::storage(format!("creating checkpoint dir {}", dir.display()), e)
        })?;

        self.varmap
            .save(&dir.join("model.safetensors"))
            .map_err(|e| {
                PreftuneError::storage("writing model.safetensors", std::io::Error::other(e))
            })?;

        let meta = CheckpointMeta {
            base_model: self.base_id.clone(),
            config: self.config.clone(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| PreftuneError::Internal(format!("serializing checkpoint meta: {e}")))?;
        fs::write(dir.join("meta.json"), json)
            .map_err(|e| PreftuneError::storage("writing meta.json", e))?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal word-level tokenizer.json with an 8-token vocabulary.
    pub(crate) const TOKENIZER_JSON: &str = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": { "type": "Whitespace" },
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {
      "<unk>": 0,
      "alpha": 1,
      "beta": 2,
      "gamma": 3,
      "delta": 4,
      "epsilon": 5,
      "zeta": 6,
      "eta": 7
    },
    "unk_token": "<unk>"
  }
}"#;

    pub(crate) fn test_tokenizer(dir: &Path) -> LmTokenizer {
        let path = dir.join("tokenizer.json");
        fs::write(&path, TOKENIZER_JSON).unwrap();
        LmTokenizer::from_file(&path).unwrap()
    }

    pub(crate) fn test_config() -> TinyLmConfig {
        TinyLmConfig {
            vocab_size: 8,
            dim: 16,
            n_layers: 1,
            n_heads: 2,
            max_seq_len: 16,
        }
    }

    fn test_model(dir: &Path, learning_rate: f64) -> TinyCausalLm {
        TinyCausalLm::new("gpt2-tiny", test_config(), test_tokenizer(dir), None, learning_rate)
            .unwrap()
    }

    #[test]
    fn test_loss_decreases_when_memorizing_one_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = test_model(dir.path(), 5e-2);
        let text = "alpha beta gamma delta epsilon zeta eta";

        let first = model.compute_loss(text).unwrap();
        model.step().unwrap();
        assert!(first.is_finite());

        let mut last = first;
        for _ in 0..30 {
            last = model.compute_loss(text).unwrap();
            model.step().unwrap();
        }
        assert!(last.is_finite());
        assert!(last < first, "loss did not decrease: {first} -> {last}");
    }

    #[test]
    fn test_step_without_pending_loss_is_a_training_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = test_model(dir.path(), 1e-3);
        let err = model.step().unwrap_err();
        assert!(matches!(err, PreftuneError::Training(_)));
    }

    #[test]
    fn test_too_short_text_is_a_training_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = test_model(dir.path(), 1e-3);
        let err = model.compute_loss("alpha").unwrap_err();
        assert!(matches!(err, PreftuneError::Training(_)));
    }

    #[test]
    fn test_save_writes_weights_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let model = test_model(dir.path(), 1e-3);

        let checkpoint_dir = dir.path().join("checkpoint");
        model.save(&checkpoint_dir).unwrap();

        assert!(checkpoint_dir.join("model.safetensors").exists());
        let meta: CheckpointMeta = serde_json::from_str(
            &fs::read_to_string(checkpoint_dir.join("meta.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(meta.base_model, "gpt2-tiny");
    }

    #[test]
    fn test_vocab_mismatch_is_a_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = TinyLmConfig {
            vocab_size: 4,
            ..test_config()
        };
        let err =
            TinyCausalLm::new("gpt2-tiny", config, test_tokenizer(dir.path()), None, 1e-3)
                .unwrap_err();
        assert!(matches!(err, PreftuneError::ModelLoad(_)));
    }
}
