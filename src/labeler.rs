//! Deterministic preference labeling over raw prompt/answer rows.
//!
//! The bundled policy is a placeholder: answers longer than five whitespace
//! tokens are accepted, the rest rejected. A human-judgment or model-scored
//! labeler can replace it behind the same `label` contract.

use crate::models::{PreferenceExample, RawExample};

/// Answers with more than this many whitespace-delimited tokens are accepted.
pub const ACCEPT_TOKEN_THRESHOLD: usize = 5;

/// Heuristic preference labeler.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferenceLabeler;

impl PreferenceLabeler {
    pub fn new() -> Self {
        Self
    }

    /// Label each raw row as accepted or rejected.
    ///
    /// Pure and deterministic; the caller decides whether to persist the
    /// result.
    pub fn label(&self, rows: &[RawExample]) -> Vec<PreferenceExample> {
        rows.iter().map(|row| self.label_row(row)).collect()
    }

    fn label_row(&self, row: &RawExample) -> PreferenceExample {
        let tokens = row.answer.split_whitespace().count();
        if tokens > ACCEPT_TOKEN_THRESHOLD {
            PreferenceExample {
                prompt: row.prompt.clone(),
                accepted_answer: Some(row.answer.clone()),
                rejected_answer: None,
            }
        } else {
            PreferenceExample {
                prompt: row.prompt.clone(),
                accepted_answer: None,
                rejected_answer: Some(row.answer.clone()),
            }
        }
    }
}
