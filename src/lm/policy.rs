//! Model capability seam required by the training stage.
//!
//! The pipeline does not interpret model internals; it only needs a policy
//! that can price a text under its next-token objective and move its
//! parameters one optimizer step. Anything satisfying this trait can sit
//! behind the training stage, including the test double below.

use crate::models::Result;
use std::path::Path;

/// A trainable causal language model.
pub trait PolicyModel {
    /// Identifier of the base model this policy was initialized from.
    fn base_id(&self) -> &str;

    /// Compute the self-supervised next-token loss over `text`, retaining
    /// whatever internal state [`step`](Self::step) needs to apply the
    /// matching update.
    fn compute_loss(&mut self, text: &str) -> Result<f64>;

    /// Apply one optimizer update minimizing the most recently computed
    /// loss. Calling this without a preceding `compute_loss` is a training
    /// failure.
    fn step(&mut self) -> Result<()>;

    /// Persist a checkpoint of the current parameters under `dir`.
    fn save(&self, dir: &Path) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::models::PreftuneError;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Shared call counters, cloneable so tests keep a view after the
    /// model moves into the pipeline.
    #[derive(Debug, Clone, Default)]
    pub struct Counters {
        pub loss_calls: Rc<Cell<usize>>,
        pub step_calls: Rc<Cell<usize>>,
    }

    /// Counting fake used by training and pipeline tests.
    #[derive(Debug, Default)]
    pub struct CountingModel {
        pub counters: Counters,
    }

    impl CountingModel {
        pub fn new(counters: Counters) -> Self {
            Self { counters }
        }
    }

    impl PolicyModel for CountingModel {
        fn base_id(&self) -> &str {
            "counting-fake"
        }

        fn compute_loss(&mut self, _text: &str) -> Result<f64> {
            self.counters.loss_calls.set(self.counters.loss_calls.get() + 1);
            Ok(1.25)
        }

        fn step(&mut self) -> Result<()> {
            self.counters.step_calls.set(self.counters.step_calls.get() + 1);
            Ok(())
        }

        fn save(&self, dir: &Path) -> Result<()> {
            std::fs::create_dir_all(dir)
                .map_err(|e| PreftuneError::storage("creating checkpoint dir", e))?;
            let body = format!("{{\"steps\":{}}}", self.counters.step_calls.get());
            std::fs::write(dir.join("fake_model.json"), body)
                .map_err(|e| PreftuneError::storage("writing fake checkpoint", e))?;
            Ok(())
        }
    }
}
