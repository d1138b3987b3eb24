//! End-to-end pipeline orchestration.
//!
//! Pipeline flow:
//! Raw rows -> [preferences stage] -> labeled rows -> [dpo_model stage] -> checkpoint
//!
//! Both stages run through the stage cache: artifacts already present in
//! the store short-circuit their stage, making a rerun against an
//! unchanged debug directory a no-op.

use crate::dataset;
use crate::labeler::PreferenceLabeler;
use crate::lm::PolicyModel;
use crate::models::{ModelCheckpoint, RawExample, Result, RunSummary};
use crate::stage::{StageCache, StageStore};
use crate::train;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Stage tag for the labeled preference table.
pub const PREFERENCES_STAGE: &str = "preferences";

/// Stage tag for the fine-tuned model manifest.
pub const DPO_MODEL_STAGE: &str = "dpo_model";

/// Result of a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The training stage ran and produced a fresh checkpoint.
    Trained(ModelCheckpoint),

    /// The training stage was short-circuited by an existing artifact.
    /// The run is complete, but no checkpoint handle was re-derived;
    /// callers must treat the model as already satisfied, not as returned.
    AlreadySatisfied {
        /// Name of the artifact that satisfied the stage
        artifact: String,
    },
}

/// Sequences the labeling and training stages through the stage cache.
pub struct PipelineRunner<'s, S: StageStore> {
    store: &'s S,
    labeler: PreferenceLabeler,
    models_dir: PathBuf,
}

impl<'s, S: StageStore> PipelineRunner<'s, S> {
    pub fn new(store: &'s S, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            labeler: PreferenceLabeler::new(),
            models_dir: models_dir.into(),
        }
    }

    /// Run the pipeline over `raw_rows`.
    ///
    /// The model is constructed lazily via `make_model`, only when the
    /// training stage actually has to run; a cached training stage never
    /// touches the base model.
    pub fn run<M, F>(
        &self,
        raw_rows: &[RawExample],
        make_model: F,
    ) -> Result<(PipelineOutcome, RunSummary)>
    where
        M: PolicyModel,
        F: FnOnce() -> Result<M>,
    {
        let start = Instant::now();
        let cache = StageCache::new(self.store);

        info!("Running preference collection");
        let labeling = cache.run_if_absent(PREFERENCES_STAGE, || {
            let labeled = self.labeler.label(raw_rows);
            dataset::preferences_to_csv(&labeled)
        })?;
        let preferences = dataset::preferences_from_csv(&labeling.bytes)?;

        let mut summary = RunSummary {
            rows_read: raw_rows.len(),
            accepted: preferences.iter().filter(|p| p.is_accepted()).count(),
            rejected: preferences.iter().filter(|p| !p.is_accepted()).count(),
            ..Default::default()
        };

        info!("Running DPO training");
        let mut trained: Option<ModelCheckpoint> = None;
        let training = cache.run_if_absent(DPO_MODEL_STAGE, || {
            let mut model = make_model()?;
            let checkpoint =
                train::train_and_checkpoint(&preferences, &mut model, &self.models_dir)?;
            let bytes = dataset::manifest_to_csv(&checkpoint)?;
            trained = Some(checkpoint);
            Ok(bytes)
        })?;

        let outcome = match trained {
            Some(checkpoint) => {
                summary.steps = checkpoint.steps;
                summary.mean_loss = checkpoint.mean_loss;
                PipelineOutcome::Trained(checkpoint)
            }
            None => PipelineOutcome::AlreadySatisfied {
                artifact: training.artifact,
            },
        };

        summary.runtime_secs = start.elapsed().as_secs_f64();
        summary.finalize();
        info!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            steps = summary.steps,
            "Pipeline complete"
        );

        Ok((outcome, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lm::testing::{CountingModel, Counters};
    use crate::models::PreftuneError;
    use crate::stage::MemoryStageStore;

    fn raw(prompt: &str, answer: &str) -> RawExample {
        RawExample {
            prompt: prompt.to_string(),
            answer: answer.to_string(),
        }
    }

    fn sample_rows() -> Vec<RawExample> {
        vec![
            raw("Q1", "a short one"),
            raw("Q2", "this is a sufficiently long answer text"),
        ]
    }

    #[test]
    fn test_first_run_trains_and_persists_both_stages() {
        let store = MemoryStageStore::new();
        let models_dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(&store, models_dir.path());
        let counters = Counters::default();

        let (outcome, summary) = runner
            .run(&sample_rows(), || {
                Ok(CountingModel::new(counters.clone()))
            })
            .unwrap();

        match outcome {
            PipelineOutcome::Trained(checkpoint) => assert_eq!(checkpoint.steps, 1),
            other => panic!("expected Trained, got {other:?}"),
        }
        assert_eq!(summary.rows_read, 2);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(counters.step_calls.get(), 1);
        assert_eq!(store.len(), 2);
        assert!(store.find(PREFERENCES_STAGE).unwrap().is_some());
        assert!(store.find(DPO_MODEL_STAGE).unwrap().is_some());
    }

    #[test]
    fn test_second_run_takes_zero_training_steps() {
        let store = MemoryStageStore::new();
        let models_dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(&store, models_dir.path());

        let first = Counters::default();
        runner
            .run(&sample_rows(), || Ok(CountingModel::new(first.clone())))
            .unwrap();

        let second = Counters::default();
        let (outcome, summary) = runner
            .run(&sample_rows(), || Ok(CountingModel::new(second.clone())))
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::AlreadySatisfied { .. }));
        assert_eq!(summary.steps, 0);
        assert_eq!(second.loss_calls.get(), 0);
        assert_eq!(second.step_calls.get(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_cached_training_stage_never_builds_a_model() {
        let store = MemoryStageStore::new();
        let models_dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(&store, models_dir.path());

        let counters = Counters::default();
        runner
            .run(&sample_rows(), || {
                Ok(CountingModel::new(counters.clone()))
            })
            .unwrap();

        // The factory erroring proves it is never invoked on the rerun.
        let (outcome, _) = runner
            .run(&sample_rows(), || {
                Err::<CountingModel, _>(PreftuneError::model_load("must not be built"))
            })
            .unwrap();
        assert!(matches!(outcome, PipelineOutcome::AlreadySatisfied { .. }));
    }

    #[test]
    fn test_stale_preferences_are_reused_when_dataset_changes() {
        let store = MemoryStageStore::new();
        let models_dir = tempfile::tempdir().unwrap();
        let runner = PipelineRunner::new(&store, models_dir.path());

        runner
            .run(&sample_rows(), || {
                Ok(CountingModel::new(Counters::default()))
            })
            .unwrap();
        let artifact = store.find(PREFERENCES_STAGE).unwrap().unwrap();

        // A changed dataset without a cleared store reuses the old labels.
        let changed = vec![raw("Q9", "completely different words in this changed answer")];
        let (_, summary) = runner
            .run(&changed, || Ok(CountingModel::new(Counters::default())))
            .unwrap();

        assert_eq!(store.find(PREFERENCES_STAGE).unwrap().unwrap(), artifact);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.rejected, 1);
    }
}
