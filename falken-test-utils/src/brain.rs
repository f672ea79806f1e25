//! A deterministic [`Brain`] stand-in for the (out of scope) neural-network
//! trainer, grounded in `falken-learner`'s own `NoopBrain`/`InstantBrain`
//! test fixtures: every call is synchronous and side-effect free beyond a
//! few in-memory counters, so assignment-processor tests can assert on
//! exact step/train counts instead of racing a real trainer.

use async_trait::async_trait;
use falken_core::{ActionSource, EpisodeState, Error as CoreError, Result as CoreResult};
use falken_learner::brain::{Brain, BrainHparams, EvalScore, StepPhase};
use falken_learner::brain_cache::BrainFactory;
use falken_learner::error::Result;
use parking_lot::Mutex;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

/// One recorded step, kept around so a test can assert on exactly what was
/// staged rather than just a count.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStep {
    pub phase: StepPhase,
    pub episode_id: String,
    pub action_source: ActionSource,
    pub timestamp_micros: i64,
}

/// A brain that counts frames and train calls instead of doing anything
/// with them. `offline_score` is returned verbatim from
/// [`Brain::compute_full_evaluation`] so tests can control model-selection
/// outcomes without faking a real trainer.
pub struct FakeBrain {
    steps: Mutex<Vec<RecordedStep>>,
    train_frames: AtomicU64,
    eval_frames: AtomicU64,
    train_calls: AtomicU64,
    /// Examples consumed since the last [`Brain::reinitialize_agent`], kept
    /// separate from `train_frames` (which tracks demo data ever staged and
    /// only resets via [`Brain::clear_step_buffers`]) so `global_step`
    /// actually resets across a restart the way the trait contract says it
    /// does.
    examples_since_restart: AtomicU64,
    examples_per_train_call: u64,
    offline_score: f64,
    hparams: Value,
}

impl FakeBrain {
    pub fn new(hparams: Value, offline_score: f64) -> Self {
        let examples_per_train_call = hparams.get("training_examples").and_then(Value::as_u64).unwrap_or(0);
        FakeBrain {
            steps: Mutex::new(Vec::new()),
            train_frames: AtomicU64::new(0),
            eval_frames: AtomicU64::new(0),
            train_calls: AtomicU64::new(0),
            examples_since_restart: AtomicU64::new(0),
            examples_per_train_call,
            offline_score,
            hparams,
        }
    }

    pub fn recorded_steps(&self) -> Vec<RecordedStep> {
        self.steps.lock().clone()
    }
}

#[async_trait]
impl Brain for FakeBrain {
    fn record_step(
        &mut self,
        _observation: &Value,
        _reward: f64,
        phase: StepPhase,
        episode_id: &str,
        _action: &Value,
        action_source: ActionSource,
        timestamp_micros: i64,
    ) {
        match action_source {
            ActionSource::HumanDemonstration => {
                self.train_frames.fetch_add(1, Ordering::SeqCst);
            }
            ActionSource::BrainAction | ActionSource::None => {
                self.eval_frames.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.steps.lock().push(RecordedStep {
            phase,
            episode_id: episode_id.to_string(),
            action_source,
            timestamp_micros,
        });
    }

    async fn train(&mut self) -> CoreResult<()> {
        self.train_calls.fetch_add(1, Ordering::SeqCst);
        self.examples_since_restart.fetch_add(self.examples_per_train_call, Ordering::SeqCst);
        Ok(())
    }

    fn num_train_frames(&self) -> u64 {
        self.train_frames.load(Ordering::SeqCst)
    }

    fn num_eval_frames(&self) -> u64 {
        self.eval_frames.load(Ordering::SeqCst)
    }

    fn global_step(&self) -> u64 {
        self.examples_since_restart.load(Ordering::SeqCst)
    }

    fn train_step_counter(&self) -> u64 {
        self.train_calls.load(Ordering::SeqCst)
    }

    async fn save_checkpoint(&self, dir: &Path) -> CoreResult<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| CoreError::InvalidSpec(e.to_string()))?;
        tokio::fs::write(dir.join("checkpoint.marker"), b"fake-checkpoint")
            .await
            .map_err(|e| CoreError::InvalidSpec(e.to_string()))
    }

    async fn export_saved_model(&self, dir: &Path) -> CoreResult<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| CoreError::InvalidSpec(e.to_string()))?;
        tokio::fs::write(dir.join("saved_model.pb"), b"fake-saved-model")
            .await
            .map_err(|e| CoreError::InvalidSpec(e.to_string()))
    }

    async fn convert_model_to_tflite(&self, _saved_dir: &Path, out_dir: &Path) -> CoreResult<()> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| CoreError::InvalidSpec(e.to_string()))?;
        tokio::fs::write(out_dir.join("model.tflite"), b"fake-tflite")
            .await
            .map_err(|e| CoreError::InvalidSpec(e.to_string()))
    }

    fn compute_full_evaluation(&self) -> Vec<EvalScore> {
        vec![EvalScore { version_id: "v0".into(), score: self.offline_score }]
    }

    fn reinitialize_agent(&mut self) {
        self.train_calls.store(0, Ordering::SeqCst);
        self.examples_since_restart.store(0, Ordering::SeqCst);
    }

    fn clear_step_buffers(&mut self) {
        self.steps.lock().clear();
        self.train_frames.store(0, Ordering::SeqCst);
        self.eval_frames.store(0, Ordering::SeqCst);
    }

    fn hparams(&self) -> &BrainHparams {
        &self.hparams
    }
}

/// Constructs a [`FakeBrain`] with a fixed offline score for every brain it
/// is asked for; used to wire up [`falken_learner::brain_cache::BrainCache`]
/// in tests without a real trainer.
pub struct FakeBrainFactory {
    offline_score: f64,
}

impl FakeBrainFactory {
    pub fn new(offline_score: f64) -> Self {
        FakeBrainFactory { offline_score }
    }
}

impl Default for FakeBrainFactory {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[async_trait]
impl BrainFactory for FakeBrainFactory {
    async fn create(
        &self,
        _brain_spec: &falken_core::BrainSpec,
        hparams: &falken_core::Hyperparameters,
    ) -> Result<Box<dyn Brain>> {
        let hparams_json = serde_json::to_value(hparams).unwrap_or(Value::Null);
        Ok(Box::new(FakeBrain::new(hparams_json, self.offline_score)))
    }
}

/// Matches [`falken_learner::brain::step_phase`]'s contract so fixtures that
/// hand-construct chunks can precompute the same phase a real processor run
/// would see, without depending on `EpisodeState` directly at the call site.
pub fn terminal_phase_for(episode_state: EpisodeState) -> Option<StepPhase> {
    match episode_state {
        EpisodeState::Success => Some(StepPhase::Success),
        EpisodeState::Failure => Some(StepPhase::Failure),
        EpisodeState::Aborted => Some(StepPhase::Aborted),
        EpisodeState::GaveUp => Some(StepPhase::GaveUp),
        EpisodeState::InProgress | EpisodeState::Unspecified => None,
    }
}
