//! Row and summary types flowing through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw prompt/answer row from the input dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExample {
    /// The prompt text
    pub prompt: String,

    /// The answer text to be labeled
    pub answer: String,
}

/// Labeled preference row produced by the labeler and consumed by training.
///
/// Exactly one of `accepted_answer` / `rejected_answer` is set by the
/// bundled heuristic. That is a property of the heuristic, not of this
/// type; a replacement labeler may fill both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceExample {
    /// The prompt text, carried through unchanged
    pub prompt: String,

    /// Answer judged acceptable, if any
    pub accepted_answer: Option<String>,

    /// Answer judged unacceptable, if any
    pub rejected_answer: Option<String>,
}

impl PreferenceExample {
    /// Whether this row contributes a gradient step during training.
    pub fn is_accepted(&self) -> bool {
        self.accepted_answer.is_some()
    }
}

/// Handle to a persisted fine-tuned model snapshot.
///
/// Doubles as the one-row manifest persisted under the `dpo_model` stage
/// tag; the weights themselves live under `dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    /// Identifier of the base model that was fine-tuned
    pub base_model: String,

    /// Directory holding the checkpoint weights and metadata
    pub dir: PathBuf,

    /// Gradient steps taken during the pass
    pub steps: usize,

    /// Mean next-token loss over the pass (0.0 when no steps were taken)
    pub mean_loss: f64,

    /// When the checkpoint was written
    pub created_at: DateTime<Utc>,
}

/// Statistics for a pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Raw rows read from the dataset
    pub rows_read: usize,

    /// Preference rows with an accepted answer
    pub accepted: usize,

    /// Preference rows with only a rejected answer
    pub rejected: usize,

    /// Gradient steps taken (0 when the training stage was cached)
    pub steps: usize,

    /// Mean training loss over the pass
    pub mean_loss: f64,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Fraction of labeled rows that were accepted (0.0 - 1.0)
    pub acceptance_rate: f64,
}

impl RunSummary {
    /// Calculate derived stats.
    pub fn finalize(&mut self) {
        let labeled = self.accepted + self.rejected;
        if labeled > 0 {
            self.acceptance_rate = self.accepted as f64 / labeled as f64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceptance_rate() {
        let mut summary = RunSummary {
            rows_read: 4,
            accepted: 3,
            rejected: 1,
            ..Default::default()
        };
        summary.finalize();
        assert!((summary.acceptance_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_acceptance_rate_empty_run() {
        let mut summary = RunSummary::default();
        summary.finalize();
        assert_eq!(summary.acceptance_rate, 0.0);
    }
}
