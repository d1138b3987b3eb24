//! Existence-checked stage execution.
//!
//! A stage runs at most once per debug directory: if any artifact tagged
//! with the stage name already exists, the stage is skipped and the cached
//! blob returned.

use crate::models::Result;
use crate::stage::store::StageStore;
use tracing::info;

/// Result of running (or skipping) a cached stage.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// The artifact blob, freshly computed or loaded from the store
    pub bytes: Vec<u8>,

    /// Name of the artifact backing this outcome
    pub artifact: String,

    /// Whether the stage was skipped in favor of an existing artifact
    pub cached: bool,
}

/// Cache wrapper around an injected [`StageStore`].
pub struct StageCache<'s, S: StageStore> {
    store: &'s S,
}

impl<'s, S: StageStore> StageCache<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Run `compute` unless an artifact tagged `stage_name` already exists.
    ///
    /// The check is existence-only: any artifact whose name contains the
    /// stage name short-circuits the stage, regardless of what inputs
    /// produced it. Changing the upstream dataset without clearing the
    /// debug directory therefore reuses the stale artifact. On a miss,
    /// `compute` runs and its output is persisted exactly once. Storage
    /// failures are fatal to the run.
    pub fn run_if_absent<F>(&self, stage_name: &str, compute: F) -> Result<StageOutcome>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        if let Some(name) = self.store.find(stage_name)? {
            info!(stage = stage_name, artifact = %name, "Found existing artifact, skipping stage");
            let bytes = self.store.load(&name)?;
            return Ok(StageOutcome {
                bytes,
                artifact: name,
                cached: true,
            });
        }

        let bytes = compute()?;
        let name = self.store.save(stage_name, &bytes)?;
        info!(stage = stage_name, artifact = %name, "Stage complete, artifact saved");
        Ok(StageOutcome {
            bytes,
            artifact: name,
            cached: false,
        })
    }
}
