//! The per-assignment training state machine (spec.md §4.4), grounded in
//! `learner/assignment_processor.py`.
//!
//! The original exposes a generator of `(status, metadata)` pairs; Rust has
//! no native generators, so [`AssignmentProcessor::next`] plays that role
//! explicitly (spec.md §9 "Coroutine-style generator"): each call drives the
//! state machine until at least one [`ProcessorEvent`] is ready, buffering
//! any extra events (a restart, for instance, always produces a `SavedModel`
//! followed by a `ProcessedStepNeedsRestart`) in an internal queue so two
//! events from one `advance` step are still observed one `next()` call at a
//! time, matching the original's two separate `yield`s.

use crate::brain::{step_phase, SharedBrain};
use crate::brain_cache::BrainCache;
use crate::error::{Error, Result};
use crate::exporter::{ExportRequest, ModelExporter};
use crate::fetcher::DataFetcher;
use crate::model_manager::{ModelRecord, ModelSelectionPolicy, SimpleBestScorePolicy};
use crate::scratch::ScratchLayout;
use crate::storage::Storage;
use falken_core::{ActionSource, Assignment, Hyperparameters, ResourceId, SessionState};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument};
use uuid::Uuid;

/// The events a training run reports (spec.md §4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorEvent {
    ProcessedStep,
    ProcessedStepNeedsRestart,
    SavedModel { model_id: String },
    WillFetchData,
    Finished,
}

/// Timing knobs for one processor (spec.md §5 "Timeouts"), normally sourced
/// from `falken-cli`'s configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub max_assignment_work_time: Duration,
    pub wait_for_data_brain: Duration,
    pub fetch_poll_interval: Duration,
    /// Manual-assignment mode (spec.md §4.7): session-state checks always
    /// report `InProgress` regardless of what the store says.
    pub manual_mode: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            max_assignment_work_time: Duration::from_secs(3600),
            wait_for_data_brain: Duration::from_secs(60),
            fetch_poll_interval: Duration::from_secs(10),
            manual_mode: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Running {
        /// Completed passes through the main loop body since start or since
        /// the last restart; reset to 0 on restart. Gates the first-fetch
        /// wait and the `iteration > 0` restart checks below, so a restart
        /// can never be requested or acted on during a generation's first
        /// pass.
        iteration: u64,
        model_saved_this_iter: bool,
        any_training_this_iter: bool,
    },
    Done,
}

/// Drives one acquired assignment's training to completion, restart, or
/// failure (spec.md §4.4.2's outer state machine).
pub struct AssignmentProcessor {
    storage: Arc<Storage>,
    scratch: ScratchLayout,
    assignment: Assignment,
    assignment_rid: ResourceId,
    config: ProcessorConfig,

    brain: Option<SharedBrain>,
    hparams: Option<Hyperparameters>,
    model_manager: Box<dyn ModelSelectionPolicy>,
    exporter: Option<ModelExporter>,
    fetcher: Option<DataFetcher>,

    started_at: Instant,
    restart_requested: bool,
    last_seen: Option<(String, u32)>,
    last_model_id: Option<String>,
    most_recent_demo_micros: i64,

    pending_events: VecDeque<ProcessorEvent>,
    state: State,
}

impl AssignmentProcessor {
    /// Constructs a processor for `assignment` (spec.md §4.4.2 `Start` →
    /// `Initialize`). If the owning session is already `Ended` or `Stale`,
    /// the processor is born finished, matching the outer diagram's direct
    /// `Start → Finished` edge.
    #[instrument(skip(storage, brain_cache, scratch, config), fields(
        project = %assignment.project_id,
        brain = %assignment.brain_id,
        session = %assignment.session_id,
    ))]
    pub async fn new(
        storage: Arc<Storage>,
        brain_cache: Arc<BrainCache>,
        scratch: ScratchLayout,
        models_root: PathBuf,
        assignment: Assignment,
        config: ProcessorConfig,
    ) -> Result<Self> {
        let assignment_rid = ResourceId::assignment(
            &assignment.project_id,
            &assignment.brain_id,
            &assignment.session_id,
            &assignment.assignment_id,
        );
        scratch.wipe_checkpoints(&assignment_rid)?;
        scratch.wipe_tmp_models(&assignment_rid)?;

        let entry_state = if config.manual_mode {
            SessionState::InProgress
        } else {
            storage
                .get_session_state(&assignment.project_id, &assignment.brain_id, &assignment.session_id)
                .await?
        };

        if matches!(entry_state, SessionState::Ended | SessionState::Stale) {
            info!("session already {:?} at entry, skipping straight to Finished", entry_state);
            return Ok(AssignmentProcessor {
                storage,
                scratch,
                assignment,
                assignment_rid,
                config,
                brain: None,
                hparams: None,
                model_manager: Box::new(SimpleBestScorePolicy::new()),
                exporter: None,
                fetcher: None,
                started_at: Instant::now(),
                restart_requested: false,
                last_seen: None,
                last_model_id: None,
                most_recent_demo_micros: 0,
                pending_events: VecDeque::new(),
                state: State::Done,
            });
        }

        let brain_spec = storage
            .get_brain_spec(&assignment.project_id, &assignment.brain_id)
            .await?;
        let hparams = falken_core::hparams::resolve(
            &falken_core::hparams::default_brain_hparams(),
            &assignment.assignment_id,
        )?;
        let ancestor_sessions = storage
            .get_ancestor_session_ids(&assignment.project_id, &assignment.brain_id, &assignment.session_id)
            .await?;

        let brain = brain_cache.get_or_create(&brain_spec, hparams.clone()).await?;

        let fetcher = DataFetcher::spawn(
            Arc::clone(&storage),
            assignment.project_id.clone(),
            assignment.brain_id.clone(),
            assignment.session_id.clone(),
            ancestor_sessions,
            config.fetch_poll_interval,
        );

        let exporter = ModelExporter::start(
            assignment.clone(),
            Arc::clone(&storage),
            Arc::clone(&brain),
            models_root,
            hparams.synchronous_export,
        );

        Ok(AssignmentProcessor {
            storage,
            scratch,
            assignment,
            assignment_rid,
            config,
            brain: Some(brain),
            hparams: Some(hparams),
            model_manager: Box::new(SimpleBestScorePolicy::new()),
            exporter: Some(exporter),
            fetcher: Some(fetcher),
            started_at: Instant::now(),
            restart_requested: false,
            last_seen: None,
            last_model_id: None,
            most_recent_demo_micros: 0,
            pending_events: VecDeque::new(),
            state: State::Running {
                iteration: 0,
                model_saved_this_iter: false,
                any_training_this_iter: false,
            },
        })
    }

    /// Pulls the next event, driving the state machine forward exactly as
    /// far as needed to produce one (spec.md §4.4's "pull-style generator").
    /// Once `Finished` has been observed, every subsequent call returns
    /// `Finished` again.
    pub async fn next(&mut self) -> Result<ProcessorEvent> {
        if let Some(event) = self.pending_events.pop_front() {
            return Ok(event);
        }
        match self.state {
            State::Done => Ok(ProcessorEvent::Finished),
            State::Running { .. } => self.advance().await,
        }
    }

    fn hparams(&self) -> &Hyperparameters {
        self.hparams.as_ref().expect("hparams set whenever state is Running")
    }

    fn brain(&self) -> &SharedBrain {
        self.brain.as_ref().expect("brain set whenever state is Running")
    }

    async fn current_session_state(&self) -> Result<SessionState> {
        if self.config.manual_mode {
            return Ok(SessionState::InProgress);
        }
        Ok(self
            .storage
            .get_session_state(&self.assignment.project_id, &self.assignment.brain_id, &self.assignment.session_id)
            .await?)
    }

    /// One pass through the main loop body (spec.md §4.4.3), queuing every
    /// event it produces and returning the first.
    async fn advance(&mut self) -> Result<ProcessorEvent> {
        let State::Running { iteration, mut model_saved_this_iter, mut any_training_this_iter } = self.state
        else {
            unreachable!("advance is only called while Running")
        };

        // Step 1: restart check.
        if iteration > 0 && self.restart_requested {
            let allowed = match self.hparams().min_train_batches() {
                None => true,
                Some(min) => self.brain().lock().await.train_step_counter() >= min,
            };
            if allowed {
                if !model_saved_this_iter {
                    let model_id = self.save_and_evaluate().await?;
                    self.pending_events.push_back(ProcessorEvent::SavedModel { model_id });
                }
                self.pending_events.push_back(ProcessorEvent::ProcessedStepNeedsRestart);

                self.scratch.wipe_checkpoints(&self.assignment_rid)?;
                self.scratch.wipe_tmp_models(&self.assignment_rid)?;
                self.brain().lock().await.reinitialize_agent();
                self.model_manager.reset();
                self.restart_requested = false;

                self.state = State::Running {
                    iteration: 0,
                    model_saved_this_iter: false,
                    any_training_this_iter: false,
                };
                return Ok(self.pending_events.pop_front().expect("just queued"));
            }
        }

        // Step 2: time budget.
        let elapsed = self.started_at.elapsed();
        if elapsed > self.config.max_assignment_work_time {
            return Err(Error::ExceededMaxWorkTime { elapsed_secs: elapsed.as_secs_f64() });
        }

        // Step 3: fetch.
        self.pending_events.push_back(ProcessorEvent::WillFetchData);
        let fetcher = self.fetcher.as_mut().expect("fetcher set whenever state is Running");
        let timeout = if iteration == 0 {
            Some(self.config.wait_for_data_brain)
        } else {
            None
        };
        let batch = fetcher.fetch(timeout).await;
        if iteration == 0 && batch.is_none() && fetcher.queries_completed() == 0 {
            return Err(Error::NoData);
        }

        if let Some(chunks) = batch {
            let mut saw_demo = false;
            {
                let mut brain = self.brain().lock().await;
                for chunk in &chunks {
                    let n = chunk.steps.len();
                    for (idx, step) in chunk.steps.iter().enumerate() {
                        let phase = step_phase(chunk.chunk_id, idx, idx + 1 == n, chunk.episode_state);
                        brain.record_step(
                            &step.observation,
                            step.reward,
                            phase,
                            &chunk.episode_id,
                            &step.action,
                            step.source,
                            step.timestamp_micros,
                        );
                        if step.source == ActionSource::HumanDemonstration {
                            saw_demo = true;
                            self.most_recent_demo_micros = self.most_recent_demo_micros.max(step.timestamp_micros);
                        }
                    }
                    self.last_seen = Some((chunk.episode_id.clone(), chunk.chunk_id));
                }
            }
            for chunk in &chunks {
                self.storage
                    .record_online_evaluation(
                        &self.assignment.project_id,
                        &self.assignment.brain_id,
                        &self.assignment.session_id,
                        chunk,
                        self.last_model_id.as_deref(),
                    )
                    .await?;
            }
            if !self.hparams().continuous && iteration > 0 && saw_demo {
                self.restart_requested = true;
            }
        }

        // Step 4: data check.
        let num_train_frames = self.brain().lock().await.num_train_frames();
        if num_train_frames == 0 {
            return self.exit_main_loop(model_saved_this_iter, any_training_this_iter).await;
        }

        // Step 5: train.
        self.brain().lock().await.train().await?;
        any_training_this_iter = true;

        // Step 6: save cadence.
        let batch_count = self.brain().lock().await.train_step_counter() * self.hparams().training_steps();
        if let Some(save_interval) = self.hparams().save_interval_batches {
            if save_interval > 0 && batch_count % save_interval == 0 {
                let model_id = self.save_and_evaluate().await?;
                model_saved_this_iter = true;
                self.pending_events.push_back(ProcessorEvent::SavedModel { model_id });
            }
        }

        // Step 7: termination check.
        if self.should_terminate().await? {
            if !model_saved_this_iter && any_training_this_iter {
                let model_id = self.save_and_evaluate().await?;
                model_saved_this_iter = true;
                self.pending_events.push_back(ProcessorEvent::SavedModel { model_id });
            }
            return self.exit_main_loop(model_saved_this_iter, any_training_this_iter).await;
        }

        self.state = State::Running { iteration: iteration + 1, model_saved_this_iter, any_training_this_iter };
        Ok(self.pending_events.pop_front().expect("WillFetchData was queued above"))
    }

    async fn should_terminate(&self) -> Result<bool> {
        let session_state = self.current_session_state().await?;
        if matches!(session_state, SessionState::Stale | SessionState::Ended) {
            return Ok(true);
        }
        let (train_step_counter, global_step) = {
            let brain = self.brain().lock().await;
            (brain.train_step_counter(), brain.global_step())
        };
        if let Some(min) = self.hparams().min_train_batches() {
            if train_step_counter >= min && self.model_manager.should_stop().is_some() {
                return Ok(true);
            }
        }
        if let Some(max) = self.hparams().max_train_examples {
            if global_step >= max {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// After the loop ends, spec.md §4.4.3 requires one last save if
    /// training happened but nothing was saved, followed by `ProcessedStep`.
    async fn exit_main_loop(&mut self, mut model_saved_this_iter: bool, any_training_this_iter: bool) -> Result<ProcessorEvent> {
        if any_training_this_iter && !model_saved_this_iter {
            let model_id = self.save_and_evaluate().await?;
            model_saved_this_iter = true;
            self.pending_events.push_back(ProcessorEvent::SavedModel { model_id });
        }
        let _ = model_saved_this_iter;
        self.pending_events.push_back(ProcessorEvent::ProcessedStep);
        self.state = State::Done;
        self.scratch.wipe_checkpoints(&self.assignment_rid)?;
        self.scratch.wipe_tmp_models(&self.assignment_rid)?;
        if let Some(exporter) = self.exporter.take() {
            exporter.stop().await?;
        }
        self.pending_events.push_back(ProcessorEvent::Finished);
        Ok(self.pending_events.pop_front().expect("ProcessedStep was queued above"))
    }

    /// One save-and-evaluate cycle (spec.md §4.4.6).
    async fn save_and_evaluate(&mut self) -> Result<String> {
        let model_id = Uuid::new_v4().to_string();
        let tmp_dir = self.scratch.tmp_checkpoint_path(&self.assignment_rid, &model_id);

        let (evals, training_examples_completed) = {
            let brain = self.brain().lock().await;
            brain.save_checkpoint(&tmp_dir).await?;
            (brain.compute_full_evaluation(), brain.global_step())
        };
        let mean_offline_score = if evals.is_empty() {
            0.0
        } else {
            evals.iter().map(|e| e.score).sum::<f64>() / evals.len() as f64
        };

        let (episode_id, chunk_id) = self.last_seen.clone().unwrap_or_default();
        let request = ExportRequest {
            tmp_checkpoint_dir: tmp_dir,
            evals,
            model_id: model_id.clone(),
            episode_id,
            chunk_id,
            training_examples_completed,
            max_training_examples: self.hparams().max_train_examples,
            most_recent_demo_micros: self.most_recent_demo_micros,
        };
        self.exporter
            .as_ref()
            .expect("exporter set whenever state is Running")
            .export_model(request)
            .await?;

        self.model_manager.record_model(ModelRecord { model_id: model_id.clone(), mean_offline_score });
        self.last_model_id = Some(model_id.clone());
        Ok(model_id)
    }
}

impl Drop for AssignmentProcessor {
    /// Scratch-area cleanup is guaranteed on every exit path, including a
    /// dropped processor that never reached `Finished` (spec.md §4.4.7).
    fn drop(&mut self) {
        let _ = self.scratch.wipe_checkpoints(&self.assignment_rid);
        let _ = self.scratch.wipe_tmp_models(&self.assignment_rid);
    }
}
