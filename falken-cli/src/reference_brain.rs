//! A minimal, deterministic stand-in for the neural-network trainer
//! (spec.md §1 "Out of scope": "the neural-network trainer itself ...
//! Treated as an opaque `Brain`"). `falken-learner::brain::Brain` is the
//! integration seam a real trainer plugs into; this module exists only so
//! `falken-learner run` has something to drive end to end without one,
//! mirroring the `NoopBrain`/`InstantBrain` fixtures used in
//! `falken-learner`'s own tests.

use async_trait::async_trait;
use falken_core::{ActionSource, Error as CoreError, Result as CoreResult};
use falken_learner::brain::{Brain, BrainHparams, EvalScore, StepPhase};
use falken_learner::brain_cache::BrainFactory;
use falken_learner::error::Result;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct ReferenceBrain {
    hparams: Value,
    train_frames: AtomicU64,
    eval_frames: AtomicU64,
    train_calls: AtomicU64,
}

#[async_trait]
impl Brain for ReferenceBrain {
    fn record_step(
        &mut self,
        _observation: &Value,
        _reward: f64,
        _phase: StepPhase,
        _episode_id: &str,
        _action: &Value,
        action_source: ActionSource,
        _timestamp_micros: i64,
    ) {
        match action_source {
            ActionSource::HumanDemonstration => {
                self.train_frames.fetch_add(1, Ordering::SeqCst);
            }
            ActionSource::BrainAction | ActionSource::None => {
                self.eval_frames.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    async fn train(&mut self) -> CoreResult<()> {
        self.train_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn num_train_frames(&self) -> u64 {
        self.train_frames.load(Ordering::SeqCst)
    }

    fn num_eval_frames(&self) -> u64 {
        self.eval_frames.load(Ordering::SeqCst)
    }

    fn global_step(&self) -> u64 {
        self.train_frames.load(Ordering::SeqCst)
    }

    fn train_step_counter(&self) -> u64 {
        self.train_calls.load(Ordering::SeqCst)
    }

    async fn save_checkpoint(&self, dir: &Path) -> CoreResult<()> {
        tokio::fs::create_dir_all(dir).await.map_err(|e| CoreError::InvalidSpec(e.to_string()))
    }

    async fn export_saved_model(&self, dir: &Path) -> CoreResult<()> {
        tokio::fs::create_dir_all(dir).await.map_err(|e| CoreError::InvalidSpec(e.to_string()))?;
        tokio::fs::write(dir.join("saved_model.pb"), b"placeholder-saved-model")
            .await
            .map_err(|e| CoreError::InvalidSpec(e.to_string()))
    }

    async fn convert_model_to_tflite(&self, _saved_dir: &Path, out_dir: &Path) -> CoreResult<()> {
        tokio::fs::create_dir_all(out_dir).await.map_err(|e| CoreError::InvalidSpec(e.to_string()))?;
        tokio::fs::write(out_dir.join("model.tflite"), b"placeholder-tflite")
            .await
            .map_err(|e| CoreError::InvalidSpec(e.to_string()))
    }

    fn compute_full_evaluation(&self) -> Vec<EvalScore> {
        vec![EvalScore { version_id: "v0".into(), score: 0.0 }]
    }

    fn reinitialize_agent(&mut self) {
        self.train_calls.store(0, Ordering::SeqCst);
    }

    fn clear_step_buffers(&mut self) {
        self.train_frames.store(0, Ordering::SeqCst);
        self.eval_frames.store(0, Ordering::SeqCst);
    }

    fn hparams(&self) -> &BrainHparams {
        &self.hparams
    }
}

pub struct ReferenceBrainFactory;

#[async_trait]
impl BrainFactory for ReferenceBrainFactory {
    async fn create(
        &self,
        _brain_spec: &falken_core::BrainSpec,
        hparams: &falken_core::Hyperparameters,
    ) -> Result<Box<dyn Brain>> {
        let hparams_json = serde_json::to_value(hparams).unwrap_or(Value::Null);
        Ok(Box::new(ReferenceBrain {
            hparams: hparams_json,
            train_frames: AtomicU64::new(0),
            eval_frames: AtomicU64::new(0),
            train_calls: AtomicU64::new(0),
        }))
    }
}
