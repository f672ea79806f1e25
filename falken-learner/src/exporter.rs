//! The model exporter (spec.md §4.6): moves a checkpoint into permanent
//! storage, exports it, zips it, and registers it with the storage façade.
//! Grounded in `model_exporter_test.py`'s constructor/`start`/`stop`/
//! `export_model` surface (the implementation itself was not retrieved).

use crate::brain::{EvalScore, SharedBrain};
use crate::error::{Error, Result};
use crate::storage::Storage;
use falken_core::Assignment;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Everything one export needs: the spec's save-and-evaluate cycle hands
/// this off as a single unit once a checkpoint has been produced (spec.md
/// §4.4.6 step 2).
pub struct ExportRequest {
    pub tmp_checkpoint_dir: PathBuf,
    pub evals: Vec<EvalScore>,
    pub model_id: String,
    pub episode_id: String,
    pub chunk_id: u32,
    pub training_examples_completed: u64,
    pub max_training_examples: Option<u64>,
    pub most_recent_demo_micros: i64,
}

/// Single-writer background worker (or inline call, if `synchronous`) that
/// moves, exports, zips, and registers one model at a time (spec.md §4.6).
/// A bounded queue of length 1 gives the processor natural back-pressure:
/// it cannot get more than one save ahead of the exporter.
pub struct ModelExporter {
    assignment: Assignment,
    storage: Arc<Storage>,
    brain: SharedBrain,
    models_root: PathBuf,
    synchronous: bool,
    job_tx: Option<mpsc::Sender<ExportRequest>>,
    worker: Option<JoinHandle<()>>,
    pending_error: Arc<StdMutex<Option<Error>>>,
}

impl ModelExporter {
    /// Starts the exporter. When `synchronous` is true (the
    /// `synchronous_export` hyperparameter, spec.md §4.4.1), `export_model`
    /// runs inline and blocks the caller instead of queuing.
    pub fn start(
        assignment: Assignment,
        storage: Arc<Storage>,
        brain: SharedBrain,
        models_root: PathBuf,
        synchronous: bool,
    ) -> Self {
        let pending_error = Arc::new(StdMutex::new(None));

        if synchronous {
            return ModelExporter {
                assignment,
                storage,
                brain,
                models_root,
                synchronous,
                job_tx: None,
                worker: None,
                pending_error,
            };
        }

        let (job_tx, mut job_rx) = mpsc::channel::<ExportRequest>(1);
        let worker_assignment = assignment.clone();
        let worker_storage = Arc::clone(&storage);
        let worker_brain = Arc::clone(&brain);
        let worker_models_root = models_root.clone();
        let worker_pending_error = Arc::clone(&pending_error);
        let worker = tokio::spawn(async move {
            while let Some(request) = job_rx.recv().await {
                let model_id = request.model_id.clone();
                if let Err(error) = run_export(
                    &worker_assignment,
                    &worker_storage,
                    &worker_brain,
                    &worker_models_root,
                    request,
                )
                .await
                {
                    warn!(model_id, %error, "model export failed");
                    *worker_pending_error.lock().unwrap() = Some(error);
                }
            }
        });

        ModelExporter {
            assignment,
            storage,
            brain,
            models_root,
            synchronous,
            job_tx: Some(job_tx),
            worker: Some(worker),
            pending_error,
        }
    }

    fn raise_pending_error(&self) -> Result<()> {
        if let Some(error) = self.pending_error.lock().unwrap().take() {
            return Err(error);
        }
        Ok(())
    }

    /// Submits (or, synchronously, performs) one export (spec.md §4.6
    /// steps 1-4). Raises any error left over from a previous asynchronous
    /// export before proceeding, matching "errors surface on the next call
    /// or on shutdown".
    #[instrument(skip(self, request), fields(model_id = %request.model_id))]
    pub async fn export_model(&self, request: ExportRequest) -> Result<()> {
        self.raise_pending_error()?;

        if self.synchronous {
            return run_export(&self.assignment, &self.storage, &self.brain, &self.models_root, request)
                .await;
        }

        let Some(job_tx) = &self.job_tx else {
            return Err(Error::InactiveExporter);
        };
        job_tx
            .send(request)
            .await
            .map_err(|_| Error::InactiveExporter)?;
        Ok(())
    }

    /// Shuts the exporter down, draining any in-flight job and surfacing
    /// its error, if any (spec.md §4.6 step 5).
    pub async fn stop(mut self) -> Result<()> {
        self.job_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
        self.raise_pending_error()
    }
}

async fn run_export(
    assignment: &Assignment,
    storage: &Storage,
    brain: &SharedBrain,
    models_root: &Path,
    request: ExportRequest,
) -> Result<()> {
    let permanent_dir = models_root.join(&request.model_id);
    if let Some(parent) = permanent_dir.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::rename(&request.tmp_checkpoint_dir, &permanent_dir).await?;

    {
        let brain = brain.lock().await;
        brain.export_saved_model(&permanent_dir).await?;
        brain
            .convert_model_to_tflite(&permanent_dir, &permanent_dir)
            .await?;
    }

    let zip_path = models_root.join(format!("{}.zip", request.model_id));
    let zip_src = permanent_dir.clone();
    let zip_dest = zip_path.clone();
    tokio::task::spawn_blocking(move || zip_directory(&zip_src, &zip_dest))
        .await
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

    let model_id = storage
        .record_new_model(
            assignment,
            &request.episode_id,
            request.chunk_id,
            request.training_examples_completed,
            request.max_training_examples,
            request.most_recent_demo_micros,
            permanent_dir.to_string_lossy().into_owned(),
            zip_path.to_string_lossy().into_owned(),
            Some(request.model_id.clone()),
        )
        .await?;

    if !request.evals.is_empty() {
        let scores = request
            .evals
            .into_iter()
            .map(|e| (e.version_id, e.score))
            .collect();
        storage.record_evaluations(assignment, &model_id, scores).await?;
    }

    info!(model_id, path = %permanent_dir.display(), "model exported");
    Ok(())
}

/// Zips `dir` into `zip_path` via a temporary file renamed into place once
/// complete, so a reader never observes a partially written archive
/// (spec.md §4.6 invariant "model directories and zip files are never
/// partially visible").
fn zip_directory(dir: &Path, zip_path: &Path) -> Result<()> {
    let tmp_path = zip_path.with_extension("zip.tmp");
    {
        let file = std::fs::File::create(&tmp_path)?;
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let name = relative.to_string_lossy().replace('\\', "/");
            if name.is_empty() {
                continue;
            }
            if path.is_dir() {
                writer.add_directory(format!("{name}/"), options)?;
            } else {
                writer.start_file(name, options)?;
                let mut source = std::fs::File::open(path)?;
                std::io::copy(&mut source, &mut writer)?;
            }
        }
        writer.finish()?;
    }
    std::fs::rename(&tmp_path, zip_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::StepPhase;
    use async_trait::async_trait;
    use falken_core::ActionSource;
    use falken_monitor::{AssignmentMonitor, LeaseManager};
    use falken_store::{LocalFileSystem, ResourceStore, SharedFileSystem};
    use serde_json::Value;
    use tokio::sync::Mutex as AsyncMutex;

    struct NoopBrain;

    #[async_trait]
    impl crate::brain::Brain for NoopBrain {
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
        }
        async fn train(&mut self) -> falken_core::Result<()> {
            Ok(())
        }
        fn num_train_frames(&self) -> u64 {
            0
        }
        fn num_eval_frames(&self) -> u64 {
            0
        }
        fn global_step(&self) -> u64 {
            0
        }
        fn train_step_counter(&self) -> u64 {
            0
        }
        async fn save_checkpoint(&self, _dir: &Path) -> falken_core::Result<()> {
            Ok(())
        }
        async fn export_saved_model(&self, dir: &Path) -> falken_core::Result<()> {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                falken_core::Error::InvalidSpec(format!("export failed: {e}"))
            })?;
            tokio::fs::write(dir.join("saved_model.pb"), b"x")
                .await
                .map_err(|e| falken_core::Error::InvalidSpec(format!("export failed: {e}")))
        }
        async fn convert_model_to_tflite(
            &self,
            _saved_dir: &Path,
            out_dir: &Path,
        ) -> falken_core::Result<()> {
            tokio::fs::write(out_dir.join("model.tflite"), b"x")
                .await
                .map_err(|e| falken_core::Error::InvalidSpec(format!("convert failed: {e}")))
        }
        fn compute_full_evaluation(&self) -> Vec<EvalScore> {
            vec![]
        }
        fn reinitialize_agent(&mut self) {}
        fn clear_step_buffers(&mut self) {}
        fn hparams(&self) -> &Value {
            static EMPTY: Value = Value::Null;
            &EMPTY
        }
    }

    fn test_storage(dir: &std::path::Path) -> Storage {
        let fs: SharedFileSystem = Arc::new(LocalFileSystem::new(dir).unwrap());
        let store = ResourceStore::new(fs.clone());
        let lease = Arc::new(LeaseManager::new(fs.clone(), 600));
        let (monitor, events_rx) = AssignmentMonitor::new(fs, lease);
        Storage::new(store, monitor, events_rx, 600)
    }

    fn test_assignment() -> Assignment {
        Assignment {
            project_id: "p".into(),
            brain_id: "b".into(),
            session_id: "s0".into(),
            assignment_id: "default".into(),
            progress: None,
            status: None,
        }
    }

    async fn write_session(storage: &Storage) {
        let mut session = falken_core::Session {
            project_id: "p".into(),
            brain_id: "b".into(),
            session_id: "s0".into(),
            session_type: falken_core::SessionType::InteractiveTraining,
            starting_snapshots: vec![],
            user_agent: "test".into(),
            created_micros: falken_core::timestamp::now_micros(),
            last_data_received_micros: 0,
            last_demo_data_received_micros: 0,
            ended_micros: 0,
            status: None,
        };
        session.last_data_received_micros = falken_core::timestamp::now_micros();
        storage.resource_store().write(session, None).await.unwrap();
    }

    #[tokio::test]
    async fn synchronous_export_moves_checkpoint_and_registers_model() {
        let store_dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(test_storage(store_dir.path()));
        write_session(&storage).await;

        let scratch_dir = tempfile::tempdir().unwrap();
        let tmp_checkpoint = scratch_dir.path().join("checkpoint");
        tokio::fs::create_dir_all(&tmp_checkpoint).await.unwrap();
        tokio::fs::write(tmp_checkpoint.join("weights.bin"), b"data")
            .await
            .unwrap();

        let models_root = scratch_dir.path().join("models");
        let brain: SharedBrain = Arc::new(AsyncMutex::new(Box::new(NoopBrain)));
        let exporter = ModelExporter::start(
            test_assignment(),
            Arc::clone(&storage),
            brain,
            models_root.clone(),
            true,
        );

        exporter
            .export_model(ExportRequest {
                tmp_checkpoint_dir: tmp_checkpoint,
                evals: vec![],
                model_id: "model-0".into(),
                episode_id: "e0".into(),
                chunk_id: 0,
                training_examples_completed: 10,
                max_training_examples: None,
                most_recent_demo_micros: 0,
            })
            .await
            .unwrap();

        assert!(models_root.join("model-0").join("saved_model.pb").exists());
        assert!(models_root.join("model-0.zip").exists());

        let rid = falken_core::ResourceId::model("p", "b", "s0", "model-0");
        let model: falken_core::Model = storage.resource_store().read(&rid).await.unwrap();
        assert_eq!(model.training_examples_completed, 10);
    }
}
