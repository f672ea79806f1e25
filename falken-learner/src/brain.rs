//! The Brain adapter contract (spec.md §4.5), the boundary between the
//! training coordination core and the (out of scope) neural-network
//! trainer. Grounded in `continuous_imitation_brain.py`'s `BCAgent`
//! surface, reduced to the methods `assignment_processor.py` actually calls.

use async_trait::async_trait;
use falken_core::{ActionSource, EpisodeState};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// `demonstration_buffer.StepPhase` (spec.md §4.5 "Phases map from chunk
/// state"): `Start` is the first step of chunk 0; terminal phases mirror
/// `episode_state`; every other step is `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Start,
    InProgress,
    Success,
    Failure,
    Aborted,
    GaveUp,
}

/// Computes the phase of one step within a chunk (spec.md §4.5), matching
/// `assignment_processor.py::_step_generator`: the first step of chunk 0 is
/// `Start`; the last step of a chunk takes the chunk's terminal state, if
/// any; everything else is `InProgress`.
pub fn step_phase(chunk_id: u32, step_index: usize, is_last_step: bool, episode_state: EpisodeState) -> StepPhase {
    if chunk_id == 0 && step_index == 0 {
        return StepPhase::Start;
    }
    if is_last_step {
        match episode_state {
            EpisodeState::Success => return StepPhase::Success,
            EpisodeState::Failure => return StepPhase::Failure,
            EpisodeState::Aborted => return StepPhase::Aborted,
            EpisodeState::GaveUp => return StepPhase::GaveUp,
            EpisodeState::InProgress | EpisodeState::Unspecified => {}
        }
    }
    StepPhase::InProgress
}

/// One `(version_id, score)` pair from a full offline evaluation (spec.md
/// §4.4.6 step 3, §4.5 `compute_full_evaluation`).
#[derive(Debug, Clone, PartialEq)]
pub struct EvalScore {
    pub version_id: String,
    pub score: f64,
}

/// The effective hyperparameters exposed back to callers as an opaque JSON
/// blob (the processor only needs the [`falken_core::Hyperparameters`]
/// fields, which it resolves itself before constructing a brain).
pub type BrainHparams = Value;

/// The minimal contract the training loop drives (spec.md §4.5). A real
/// implementation wraps the (out of scope) neural-network trainer; the
/// reference implementation used by tests lives in `falken-test-utils`.
#[async_trait]
pub trait Brain: Send + Sync {
    /// Enqueues one step of demonstration or inference data (spec.md §4.5
    /// `record_step`).
    fn record_step(
        &mut self,
        observation: &Value,
        reward: f64,
        phase: StepPhase,
        episode_id: &str,
        action: &Value,
        action_source: ActionSource,
        timestamp_micros: i64,
    );

    /// Performs one call's worth of gradient updates: `training_steps`
    /// batches of size `batch_size` (spec.md §4.5 `train`).
    async fn train(&mut self) -> falken_core::Result<()>;

    /// Number of demonstration frames currently staged for training.
    fn num_train_frames(&self) -> u64;

    /// Number of demonstration frames staged for evaluation.
    fn num_eval_frames(&self) -> u64;

    /// Total training examples consumed across every `train()` call since
    /// the last [`Brain::reinitialize_agent`] (spec.md §4.4.6 step 4
    /// `training_examples_done`).
    fn global_step(&self) -> u64;

    /// Number of `train()` calls made since the last reinitialization
    /// (spec.md §4.4.5 "brain.train_step_counter").
    fn train_step_counter(&self) -> u64;

    async fn save_checkpoint(&self, dir: &Path) -> falken_core::Result<()>;

    async fn export_saved_model(&self, dir: &Path) -> falken_core::Result<()>;

    async fn convert_model_to_tflite(&self, saved_dir: &Path, out_dir: &Path) -> falken_core::Result<()>;

    /// Computes one `(version_id, score)` pair per accumulated eval dataset
    /// version (spec.md §4.4.6 step 3, §4.5 `compute_full_evaluation`).
    fn compute_full_evaluation(&self) -> Vec<EvalScore>;

    /// Cheap reset that preserves the compile cache (spec.md §4.5
    /// `reinitialize_agent`), used on a `PROCESSED_STEP_NEEDS_RESTART`
    /// restart (spec.md §4.4.3).
    fn reinitialize_agent(&mut self);

    /// Wipes demo, replay, and eval buffers (spec.md §4.5
    /// `clear_step_buffers`).
    fn clear_step_buffers(&mut self);

    /// The effective hyperparameters this brain was constructed with.
    fn hparams(&self) -> &BrainHparams;
}

/// Shared handle to a brain, guarded by an async mutex so the processor
/// (training, stepping) and the model exporter (exporting, converting) can
/// both hold a reference without racing on the underlying trainer (spec.md
/// §4.5, §4.6). A real implementation's export methods are expected to
/// operate on the on-disk checkpoint rather than live in-memory state, but
/// the mutex makes that safety property structural rather than assumed.
pub type SharedBrain = Arc<AsyncMutex<Box<dyn Brain>>>;

/// A brain together with the effective hyperparameters it was constructed
/// from (spec.md §4.4.1's resolved [`falken_core::Hyperparameters`] plus the
/// concrete `Brain` it produced), as returned by a [`crate::brain_cache::BrainCache`].
pub struct BrainHandle {
    pub brain: SharedBrain,
    pub hparams: falken_core::Hyperparameters,
}
