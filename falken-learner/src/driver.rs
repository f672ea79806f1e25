//! The learner driver (spec.md §4.7), grounded in `learner/learner.py`'s
//! outer run loop.

use crate::brain_cache::BrainCache;
use crate::error::{Error, Result};
use crate::processor::{AssignmentProcessor, ProcessorConfig, ProcessorEvent};
use crate::scratch::ScratchLayout;
use crate::storage::Storage;
use async_trait::async_trait;
use falken_core::{Assignment, SessionType};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Notified with the failing assignment whenever a driven assignment ends
/// in error (spec.md §4.7 "Error listeners ... notified with (project,
/// brain, session, assignment)").
#[async_trait]
pub trait ErrorListener: Send + Sync {
    async fn on_error(&self, assignment: &Assignment, error: &Error);
}

/// The outer loop an operator runs: fetch an assignment, drive it to
/// completion, record the outcome, always release the lease (spec.md §4.7).
pub struct LearnerDriver {
    storage: Arc<Storage>,
    brain_cache: Arc<BrainCache>,
    scratch: ScratchLayout,
    models_root: PathBuf,
    config: ProcessorConfig,
    error_listeners: Vec<Arc<dyn ErrorListener>>,
}

impl LearnerDriver {
    pub fn new(
        storage: Arc<Storage>,
        brain_cache: Arc<BrainCache>,
        scratch: ScratchLayout,
        models_root: PathBuf,
        config: ProcessorConfig,
    ) -> Self {
        LearnerDriver {
            storage,
            brain_cache,
            scratch,
            models_root,
            config,
            error_listeners: Vec::new(),
        }
    }

    pub fn add_error_listener(&mut self, listener: Arc<dyn ErrorListener>) {
        self.error_listeners.push(listener);
    }

    /// **Normal mode.** Waits up to `timeout` for a pending assignment,
    /// drives it to `Finished`, and records completion. Returns `false` if
    /// no assignment arrived within `timeout` (spec.md §4.7, §4.2).
    #[instrument(skip(self))]
    pub async fn run_once(&self, timeout: Option<Duration>) -> Result<bool> {
        let Some(assignment) = self.storage.receive_assignment(timeout).await? else {
            return Ok(false);
        };
        self.process(assignment, false).await?;
        Ok(true)
    }

    /// Runs [`Self::run_once`] with no timeout, forever (or until an
    /// unrecoverable error propagates).
    pub async fn run_forever(&self) -> Result<()> {
        loop {
            self.run_once(None).await?;
        }
    }

    /// **Manual-assignment mode** (spec.md §4.7): bypasses the queue,
    /// creates a fresh session and assignment so the source data a real
    /// client submitted is never mutated, and processes it with
    /// session-state checks pinned to `InProgress`.
    #[instrument(skip(self))]
    pub async fn run_manual_assignment(
        &self,
        project: &str,
        brain: &str,
        session_id: &str,
        assignment_id: &str,
    ) -> Result<()> {
        let assignment = self
            .storage
            .create_session_and_assignment(
                project,
                brain,
                session_id,
                SessionType::InteractiveTraining,
                Vec::new(),
                assignment_id,
            )
            .await?;
        self.process(assignment, true).await
    }

    #[instrument(skip(self, assignment), fields(
        project = %assignment.project_id,
        brain = %assignment.brain_id,
        session = %assignment.session_id,
        assignment_id = %assignment.assignment_id,
    ))]
    async fn process(&self, assignment: Assignment, manual_mode: bool) -> Result<()> {
        let config = ProcessorConfig { manual_mode, ..self.config.clone() };
        match self.drive(assignment.clone(), config).await {
            Ok(()) => {
                info!("assignment finished");
                self.storage.record_assignment_done(&assignment).await?;
                Ok(())
            }
            Err(error) => {
                warn!(%error, "assignment failed");
                for listener in &self.error_listeners {
                    listener.on_error(&assignment, &error).await;
                }
                if let Err(report_error) = self.storage.handle_assignment_error(&assignment, &error.to_string()).await {
                    error!(%report_error, "failed to record assignment error status");
                }
                if let Err(release_error) = self.storage.record_assignment_done(&assignment).await {
                    error!(%release_error, "failed to release assignment lease after error");
                }
                Err(error)
            }
        }
    }

    async fn drive(&self, assignment: Assignment, config: ProcessorConfig) -> Result<()> {
        let mut processor = AssignmentProcessor::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.brain_cache),
            self.scratch.clone(),
            self.models_root.clone(),
            assignment,
            config,
        )
        .await?;

        loop {
            match processor.next().await? {
                ProcessorEvent::Finished => return Ok(()),
                ProcessorEvent::ProcessedStepNeedsRestart
                | ProcessorEvent::ProcessedStep
                | ProcessorEvent::SavedModel { .. }
                | ProcessorEvent::WillFetchData => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::{EvalScore, StepPhase};
    use crate::brain_cache::BrainFactory;
    use async_trait::async_trait;
    use falken_core::{ActionSource, BrainSpec, EpisodeState, Hyperparameters};
    use falken_monitor::{AssignmentMonitor, LeaseManager};
    use falken_store::{LocalFileSystem, ResourceStore, SharedFileSystem};
    use serde_json::Value;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct InstantBrain {
        hparams: Value,
        frames: AtomicU64,
        train_steps: AtomicU64,
    }

    #[async_trait]
    impl crate::brain::Brain for InstantBrain {
        fn record_step(
            &mut self,
            _observation: &Value,
            _reward: f64,
            _phase: StepPhase,
            _episode_id: &str,
            _action: &Value,
            _action_source: ActionSource,
            _timestamp_micros: i64,
        ) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
        async fn train(&mut self) -> falken_core::Result<()> {
            self.train_steps.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn num_train_frames(&self) -> u64 {
            self.frames.load(Ordering::SeqCst)
        }
        fn num_eval_frames(&self) -> u64 {
            0
        }
        fn global_step(&self) -> u64 {
            self.train_steps.load(Ordering::SeqCst) * 32
        }
        fn train_step_counter(&self) -> u64 {
            self.train_steps.load(Ordering::SeqCst)
        }
        async fn save_checkpoint(&self, dir: &Path) -> falken_core::Result<()> {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| falken_core::Error::InvalidSpec(e.to_string()))
        }
        async fn export_saved_model(&self, dir: &Path) -> falken_core::Result<()> {
            tokio::fs::write(dir.join("saved_model.pb"), b"x")
                .await
                .map_err(|e| falken_core::Error::InvalidSpec(e.to_string()))
        }
        async fn convert_model_to_tflite(&self, _saved_dir: &Path, out_dir: &Path) -> falken_core::Result<()> {
            tokio::fs::write(out_dir.join("model.tflite"), b"x")
                .await
                .map_err(|e| falken_core::Error::InvalidSpec(e.to_string()))
        }
        fn compute_full_evaluation(&self) -> Vec<EvalScore> {
            vec![EvalScore { version_id: "v0".into(), score: 1.0 }]
        }
        fn reinitialize_agent(&mut self) {
            self.train_steps.store(0, Ordering::SeqCst);
        }
        fn clear_step_buffers(&mut self) {
            self.frames.store(0, Ordering::SeqCst);
        }
        fn hparams(&self) -> &Value {
            &self.hparams
        }
    }

    struct InstantFactory;

    #[async_trait]
    impl BrainFactory for InstantFactory {
        async fn create(&self, _brain_spec: &BrainSpec, _hparams: &Hyperparameters) -> crate::error::Result<Box<dyn crate::brain::Brain>> {
            Ok(Box::new(InstantBrain {
                hparams: Value::Null,
                frames: AtomicU64::new(1),
                train_steps: AtomicU64::new(0),
            }))
        }
    }

    fn minimal_brain_spec() -> BrainSpec {
        use falken_core::brainspec::{ActionSpec, ActionTypeSpec, CategorySpec, EntitySpec, LeafSpec, ObservationSpec};
        BrainSpec::new(
            ObservationSpec {
                player: Some(EntitySpec { name: "player".into(), has_position: true, has_rotation: true, fields: vec![] }),
                camera: None,
                global_entities: vec![],
            },
            ActionSpec {
                actions: vec![ActionTypeSpec {
                    name: "move".into(),
                    action: LeafSpec::Category(CategorySpec { values: vec!["left".into(), "right".into()] }),
                }],
            },
        )
        .unwrap()
    }

    fn make_driver(root: &Path) -> LearnerDriver {
        let fs: SharedFileSystem = Arc::new(LocalFileSystem::new(root.join("store")).unwrap());
        let store = ResourceStore::new(fs.clone());
        let lease = Arc::new(LeaseManager::new(fs.clone(), 600));
        let (monitor, events_rx) = AssignmentMonitor::new(fs, lease);
        let storage = Arc::new(Storage::new(store, monitor, events_rx, 600));
        let brain_cache = Arc::new(BrainCache::new(Arc::new(InstantFactory)));
        let scratch = ScratchLayout::new(
            root.join("checkpoints"),
            root.join("tmp_models"),
            root.join("summaries"),
        );
        let config = ProcessorConfig {
            max_assignment_work_time: Duration::from_secs(60),
            wait_for_data_brain: Duration::from_millis(50),
            fetch_poll_interval: Duration::from_millis(10),
            manual_mode: false,
        };
        LearnerDriver::new(storage, brain_cache, scratch, root.join("models"), config)
    }

    #[tokio::test]
    async fn manual_assignment_mode_creates_and_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let driver = make_driver(dir.path());

        let brain = falken_core::Brain {
            project_id: "p".into(),
            brain_id: "b".into(),
            brain_spec: minimal_brain_spec(),
        };
        driver.storage.resource_store().write(brain, None).await.unwrap();

        driver
            .run_manual_assignment("p", "b", "s0", "default")
            .await
            .unwrap();
    }
}
