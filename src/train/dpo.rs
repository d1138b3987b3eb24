//! DPO-style optimization pass.
//!
//! Full DPO contrasts accepted and rejected log-likelihoods against a
//! frozen reference model (Rafailov et al.). This stage implements the
//! simplified, asymmetric approximation: each preference row with an
//! accepted answer contributes one gradient step on the next-token loss of
//! `prompt + accepted answer`; rejected-only rows carry no signal and are
//! skipped. One pass, row by row, no batching, no convergence criterion.

use crate::lm::PolicyModel;
use crate::models::{ModelCheckpoint, PreferenceExample, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::info;

/// Directory name of the fine-tuned snapshot under the models dir.
pub const CHECKPOINT_DIR_NAME: &str = "dpo_model";

/// Outcome of a single training pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainReport {
    /// Gradient steps taken (one per accepted row)
    pub steps: usize,

    /// Rows skipped for lacking an accepted answer
    pub skipped: usize,

    /// Mean next-token loss over the taken steps (0.0 when none)
    pub mean_loss: f64,
}

/// Run one optimization pass over the preference rows.
pub fn train_preferences(
    preferences: &[PreferenceExample],
    model: &mut dyn PolicyModel,
) -> Result<TrainReport> {
    info!(
        rows = preferences.len(),
        base_model = model.base_id(),
        "Starting DPO training pass"
    );

    let pb = ProgressBar::new(preferences.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}")
            .unwrap()
            .progress_chars("##-"),
    );

    let mut report = TrainReport::default();
    let mut loss_sum = 0.0;

    for row in preferences {
        let Some(accepted) = &row.accepted_answer else {
            report.skipped += 1;
            pb.inc(1);
            continue;
        };

        let text = format!("{}{}", row.prompt, accepted);
        let loss = model.compute_loss(&text)?;
        model.step()?;

        report.steps += 1;
        loss_sum += loss;
        pb.set_message(format!("steps: {}", report.steps));
        pb.inc(1);
    }
    pb.finish_and_clear();

    if report.steps > 0 {
        report.mean_loss = loss_sum / report.steps as f64;
    }

    info!(
        steps = report.steps,
        skipped = report.skipped,
        mean_loss = report.mean_loss,
        "Training pass complete"
    );
    Ok(report)
}

/// Run the training pass and persist the resulting snapshot.
///
/// The checkpoint is written even when zero steps were taken; an empty
/// pass snapshots the unmodified base model.
pub fn train_and_checkpoint(
    preferences: &[PreferenceExample],
    model: &mut dyn PolicyModel,
    models_dir: &Path,
) -> Result<ModelCheckpoint> {
    let report = train_preferences(preferences, model)?;

    let dir = models_dir.join(CHECKPOINT_DIR_NAME);
    model.save(&dir)?;
    info!(dir = %dir.display(), "Checkpoint saved");

    Ok(ModelCheckpoint {
        base_model: model.base_id().to_string(),
        dir,
        steps: report.steps,
        mean_loss: report.mean_loss,
        created_at: Utc::now(),
    })
}
