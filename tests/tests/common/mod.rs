//! Shared harness for the end-to-end scenarios (spec.md §8 "Concrete
//! scenarios"): wires a real `LocalFileSystem`-backed store and monitor to a
//! `LearnerDriver` the same way `falken-cli::run` does, but with a
//! `FakeBrain` in place of the out-of-scope neural-network trainer.

use falken_core::timestamp::now_micros;
use falken_core::{Assignment, BrainSpec, SessionType};
use falken_learner::brain_cache::BrainCache;
use falken_learner::driver::LearnerDriver;
use falken_learner::error::Result;
use falken_learner::processor::{AssignmentProcessor, ProcessorConfig};
use falken_learner::scratch::ScratchLayout;
use falken_learner::storage::Storage;
use falken_monitor::{AssignmentMonitor, LeaseManager};
use falken_store::{LocalFileSystem, ResourceStore, SharedFileSystem};
use falken_test_utils::FakeBrainFactory;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub storage: Arc<Storage>,
    pub brain_cache: Arc<BrainCache>,
    pub scratch: ScratchLayout,
    pub models_root: PathBuf,
}

impl Harness {
    pub async fn new(offline_score: f64, stale_seconds: i64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let fs: SharedFileSystem = Arc::new(LocalFileSystem::new(dir.path().join("store")).unwrap());
        let store = ResourceStore::new(fs.clone());
        let lease = Arc::new(LeaseManager::new(fs.clone(), stale_seconds));
        let (monitor, events_rx) = AssignmentMonitor::new(fs, lease);
        monitor.start().await.unwrap();

        let storage = Arc::new(Storage::new(store, monitor, events_rx, stale_seconds));
        let brain_cache = Arc::new(BrainCache::new(Arc::new(FakeBrainFactory::new(offline_score))));
        let scratch = ScratchLayout::new(
            dir.path().join("checkpoints"),
            dir.path().join("tmp_models"),
            dir.path().join("summaries"),
        );
        let models_root = dir.path().join("models");

        Harness { dir, storage, brain_cache, scratch, models_root }
    }

    pub fn driver(&self, config: ProcessorConfig) -> LearnerDriver {
        LearnerDriver::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.brain_cache),
            self.scratch.clone(),
            self.models_root.clone(),
            config,
        )
    }

    pub async fn write_brain(&self, project: &str, brain: &str, spec: BrainSpec) {
        let record = falken_core::Brain {
            project_id: project.into(),
            brain_id: brain.into(),
            brain_spec: spec,
        };
        self.storage.resource_store().write(record, None).await.unwrap();
    }

    /// Writes a fresh session with `last_data_received_micros` pinned to
    /// wall-clock "now" so `GetSessionState` reports `InProgress` rather than
    /// `Stale` (session staleness is derived against real time, spec.md
    /// §4.3).
    pub async fn write_fresh_session(
        &self,
        project: &str,
        brain: &str,
        session_id: &str,
        session_type: SessionType,
    ) {
        let now = now_micros();
        let session = falken_core::Session {
            project_id: project.into(),
            brain_id: brain.into(),
            session_id: session_id.into(),
            session_type,
            starting_snapshots: vec![],
            user_agent: "falken-integration-tests".into(),
            created_micros: now,
            last_data_received_micros: now,
            last_demo_data_received_micros: now,
            ended_micros: 0,
            status: None,
        };
        self.storage.resource_store().write(session, None).await.unwrap();
    }

    pub async fn write_assignment(&self, assignment: &falken_core::Assignment) {
        self.storage.resource_store().write(assignment.clone(), None).await.unwrap();
    }

    pub async fn write_chunk(&self, chunk: falken_core::EpisodeChunk) {
        self.storage.resource_store().write(chunk, None).await.unwrap();
    }

    /// Constructs a processor directly over `assignment`, bypassing the
    /// monitor's lease queue so scenario tests can drive `next()` with exact
    /// control over event-by-event assertions.
    pub async fn new_processor(
        &self,
        assignment: Assignment,
        config: ProcessorConfig,
    ) -> Result<AssignmentProcessor> {
        AssignmentProcessor::new(
            Arc::clone(&self.storage),
            Arc::clone(&self.brain_cache),
            self.scratch.clone(),
            self.models_root.clone(),
            assignment,
            config,
        )
        .await
    }
}

pub fn fast_config(manual_mode: bool) -> ProcessorConfig {
    ProcessorConfig {
        max_assignment_work_time: Duration::from_secs(60),
        wait_for_data_brain: Duration::from_millis(200),
        fetch_poll_interval: Duration::from_millis(20),
        manual_mode,
    }
}
