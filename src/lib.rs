//! preftune - preference labeling and DPO-style fine-tuning with stage
//! caching.
//!
//! ## Architecture
//!
//! Two cacheable stages run in sequence:
//! - **preferences**: label raw prompt/answer rows as accepted or rejected
//!   using a deterministic heuristic
//! - **dpo_model**: fine-tune a causal LM on the accepted rows with a
//!   simplified, accepted-only DPO-style loss
//!
//! Each stage persists its artifact to a [`stage::StageStore`]; an artifact
//! already tagged with the stage name short-circuits the stage on later
//! runs. The model behind the training stage is any [`lm::PolicyModel`];
//! the bundled implementation is a small candle-backed causal LM.

pub mod dataset;
pub mod labeler;
pub mod lm;
pub mod models;
pub mod pipeline;
pub mod stage;
pub mod train;

// Re-exports for convenience
pub use labeler::PreferenceLabeler;
pub use lm::{ModelLoader, PolicyModel, TinyCausalLm, DEFAULT_BASE_MODEL};
pub use models::{
    Config, ModelCheckpoint, PreferenceExample, PreftuneError, RawExample, Result, RunSummary,
};
pub use pipeline::{PipelineOutcome, PipelineRunner};
pub use stage::{DirStageStore, MemoryStageStore, StageCache, StageStore};
pub use train::{train_preferences, TrainReport};
