//! The storage façade (spec.md §4.3), grounded in `learner/storage.py`.
//!
//! Everything the processor and driver need from the store goes through
//! here: raw `ResourceStore`/`AssignmentMonitor` calls never leak past this
//! module, matching the original's `Storage` class boundary.

use crate::error::{Error, Result};
use falken_core::timestamp::now_micros;
use falken_core::{
    Assignment, BrainSpec, EpisodeChunk, Model, OfflineEvaluation, OnlineEvaluation, Progress,
    Session, SessionState, SessionType, Snapshot, SnapshotParents,
};
use falken_monitor::{AssignmentMonitor, MonitorEvent};
use falken_store::ResourceStore;
use falken_core::ResourceId;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use uuid::Uuid;

/// Typed storage operations over the content-addressed store and the
/// assignment queue (spec.md §4.3). Holds the monitor's event receiver
/// behind an async mutex so `receive_assignment` can be called repeatedly
/// from a single driver loop.
pub struct Storage {
    store: ResourceStore,
    monitor: Arc<AssignmentMonitor>,
    events_rx: AsyncMutex<mpsc::Receiver<MonitorEvent>>,
    stale_seconds: i64,
}

impl Storage {
    pub fn new(
        store: ResourceStore,
        monitor: Arc<AssignmentMonitor>,
        events_rx: mpsc::Receiver<MonitorEvent>,
        stale_seconds: i64,
    ) -> Self {
        Storage {
            store,
            monitor,
            events_rx: AsyncMutex::new(events_rx),
            stale_seconds,
        }
    }

    pub fn resource_store(&self) -> &ResourceStore {
        &self.store
    }

    /// `GetBrainSpec` (spec.md §4.3): reads the brain record and returns its
    /// spec. Brains are immutable after creation (spec.md §3), so there is
    /// no staleness concern in caching the result elsewhere.
    pub async fn get_brain_spec(&self, project: &str, brain: &str) -> Result<BrainSpec> {
        let record: falken_core::Brain = self.store.read(&ResourceId::brain(project, brain)).await?;
        Ok(record.brain_spec)
    }

    /// `GetSessionState` (spec.md §4.3): reads the session and derives its
    /// state at `now_micros`.
    pub async fn get_session_state(
        &self,
        project: &str,
        brain: &str,
        session: &str,
    ) -> Result<SessionState> {
        let session = self.read_session(project, brain, session).await?;
        if session.is_poisoned() {
            return Ok(SessionState::Ended);
        }
        Ok(session.state(now_micros(), self.stale_seconds))
    }

    pub async fn read_session(&self, project: &str, brain: &str, session: &str) -> Result<Session> {
        Ok(self
            .store
            .read(&ResourceId::session(project, brain, session))
            .await?)
    }

    /// `GetAncestorSessionIds` (spec.md §4.3): walks a session's starting
    /// snapshots' ancestor DAG and resolves every snapshot id reached back
    /// to the session that produced it.
    pub async fn get_ancestor_session_ids(
        &self,
        project: &str,
        brain: &str,
        session: &str,
    ) -> Result<HashSet<String>> {
        let session = self.read_session(project, brain, session).await?;

        let mut ancestor_snapshot_ids: HashSet<String> =
            session.starting_snapshots.iter().cloned().collect();
        for snapshot_id in &session.starting_snapshots {
            let snapshot = self.read_snapshot(project, brain, snapshot_id).await?;
            for edge in &snapshot.ancestor_snapshots {
                ancestor_snapshot_ids.extend(edge.parent_snapshot_ids.iter().cloned());
            }
        }

        let mut ancestor_session_ids = HashSet::new();
        for snapshot_id in &ancestor_snapshot_ids {
            let snapshot = self.read_snapshot(project, brain, snapshot_id).await?;
            ancestor_session_ids.insert(snapshot.session_id);
        }
        Ok(ancestor_session_ids)
    }

    async fn read_snapshot(&self, project: &str, brain: &str, snapshot_id: &str) -> Result<Snapshot> {
        Ok(self
            .store
            .read(&ResourceId::snapshot(project, brain, snapshot_id))
            .await?)
    }

    /// `GetEpisodeChunks` (spec.md §4.3): every chunk under any of
    /// `sessions`, in timestamp order, regardless of `min_timestamp_micros`
    /// (callers that need incremental fetching dedupe by `(session_id,
    /// episode_id, chunk_id)` themselves, matching `_chunk_generator`'s own
    /// dedup set rather than relying on server-side cursoring).
    pub async fn get_episode_chunks(
        &self,
        project: &str,
        brain: &str,
        sessions: &[String],
    ) -> Result<Vec<EpisodeChunk>> {
        if sessions.is_empty() {
            return Ok(Vec::new());
        }
        let session_glob = if sessions.len() == 1 {
            sessions[0].clone()
        } else {
            format!("{{{}}}", sessions.join(","))
        };
        let glob = ResourceId::chunk_glob(project, brain, &session_glob);
        let (rids, _) = self.store.list(&glob, &Default::default()).await?;
        let mut chunks = Vec::with_capacity(rids.len());
        for rid in rids {
            chunks.push(self.store.read(&rid).await?);
        }
        Ok(chunks)
    }

    /// `ReceiveAssignment` (spec.md §4.3, §4.2): blocks on the monitor's
    /// event stream, attempting to acquire the lease on each pending
    /// assignment observed, until either one is won or `timeout` elapses.
    /// `None` timeout blocks indefinitely.
    pub async fn receive_assignment(&self, timeout: Option<Duration>) -> Result<Option<Assignment>> {
        let mut events = self.events_rx.lock().await;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let event = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    match tokio::time::timeout(remaining, events.recv()).await {
                        Ok(Some(event)) => event,
                        Ok(None) | Err(_) => return Ok(None),
                    }
                }
                None => match events.recv().await {
                    Some(event) => event,
                    None => return Ok(None),
                },
            };

            if let MonitorEvent::PendingAssignment(rid) = event {
                if self.monitor.acquire_assignment(&rid).await? {
                    let assignment: Assignment = self.store.read(&rid).await?;
                    return Ok(Some(assignment));
                }
            }
        }
    }

    /// Releases the lease on `assignment`'s resource id (the second half of
    /// `ReceiveAssignment`'s lease protocol, spec.md §4.2).
    pub async fn release_assignment(&self, assignment: &Assignment) -> Result<()> {
        let rid = ResourceId::assignment(
            &assignment.project_id,
            &assignment.brain_id,
            &assignment.session_id,
            &assignment.assignment_id,
        );
        Ok(self.monitor.release_assignment(&rid).await?)
    }

    /// `RecordNewModel` (spec.md §4.3, §3 invariant 2): writes a `Model`
    /// record, unless the owning session has already ended, in which case
    /// the write is silently suppressed and only the model id is returned
    /// (`record_new_model`'s `ENDED`-session check in the original
    /// implementation: a model saved after `StopSession` would dangle, with
    /// no session left to select it for evaluation).
    #[allow(clippy::too_many_arguments)]
    pub async fn record_new_model(
        &self,
        assignment: &Assignment,
        episode_id: &str,
        chunk_id: u32,
        training_examples_completed: u64,
        max_training_examples: Option<u64>,
        most_recent_demo_micros: i64,
        model_path: String,
        zip_path: String,
        model_id: Option<String>,
    ) -> Result<String> {
        let model_id = model_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let state = self
            .get_session_state(&assignment.project_id, &assignment.brain_id, &assignment.session_id)
            .await?;
        if state == SessionState::Ended {
            return Ok(model_id);
        }

        let model = Model {
            project_id: assignment.project_id.clone(),
            brain_id: assignment.brain_id.clone(),
            session_id: assignment.session_id.clone(),
            model_id: model_id.clone(),
            assignment_id: assignment.assignment_id.clone(),
            episode_id: episode_id.to_string(),
            chunk_id,
            model_path,
            zip_path,
            training_examples_completed,
            max_training_examples,
            most_recent_demo_micros,
        };
        self.store.write(model, None).await?;
        Ok(model_id)
    }

    /// `RecordEvaluations` (spec.md §4.3, §4.4.6 step 3): writes one
    /// `OfflineEvaluation` per `(version_id, score)` pair produced by
    /// `Brain::compute_full_evaluation`. Suppressed once the owning session
    /// has ended, mirroring `record_new_model`'s `Ended`-session check: an
    /// evaluation attributed to a model that itself was never written would
    /// dangle (spec.md §8 "no Model or OfflineEvaluation records are
    /// created with S as session after the end").
    pub async fn record_evaluations(
        &self,
        assignment: &Assignment,
        model_id: &str,
        scores: Vec<(String, f64)>,
    ) -> Result<()> {
        let state = self
            .get_session_state(&assignment.project_id, &assignment.brain_id, &assignment.session_id)
            .await?;
        if state == SessionState::Ended {
            return Ok(());
        }
        for (offline_evaluation_id, score) in scores {
            let evaluation = OfflineEvaluation {
                project_id: assignment.project_id.clone(),
                brain_id: assignment.brain_id.clone(),
                session_id: assignment.session_id.clone(),
                model_id: model_id.to_string(),
                offline_evaluation_id,
                score,
            };
            self.store.write(evaluation, None).await?;
        }
        Ok(())
    }

    /// Records a per-episode online evaluation (spec.md §9 supplemented
    /// feature; GLOSSARY "Online evaluation"), grounded in
    /// `submit_episode_chunks_handler.py::_record_online_evaluation`. Only
    /// fires when the episode's merged steps type across every chunk is
    /// `OnlyInferences` and exactly one model contributed its actions: a
    /// mixed-source or multi-model episode cannot be attributed to a single
    /// model's score.
    pub async fn record_online_evaluation(
        &self,
        project: &str,
        brain: &str,
        session: &str,
        chunk: &EpisodeChunk,
        contributing_model_id: Option<&str>,
    ) -> Result<()> {
        if !chunk.episode_state.is_complete() {
            return Ok(());
        }
        let Some(score) = chunk.episode_state.score() else {
            return Ok(());
        };
        let Some(model_id) = contributing_model_id else {
            return Ok(());
        };

        let glob = ResourceId::chunk(project, brain, session, &chunk.episode_id, "*");
        let (rids, _) = self.store.list(&glob, &Default::default()).await?;
        let mut merged = falken_core::StepsType::Unknown;
        for rid in rids {
            let sibling: EpisodeChunk = self.store.read(&rid).await?;
            merged = merged.merge(sibling.steps_type());
        }
        if merged != falken_core::StepsType::OnlyInferences {
            return Ok(());
        }

        let evaluation = OnlineEvaluation {
            project_id: project.to_string(),
            brain_id: brain.to_string(),
            session_id: session.to_string(),
            episode_id: chunk.episode_id.clone(),
            model_id: model_id.to_string(),
            score,
        };
        self.store.write(evaluation, None).await?;
        Ok(())
    }

    /// `HandleAssignmentError` (spec.md §4.3, §7): poisons both the
    /// assignment and its owning session by stamping `status`, so future
    /// `GetSessionState`/`record_new_model` callers treat the session as
    /// terminal even though it has not formally ended.
    pub async fn handle_assignment_error(&self, assignment: &Assignment, message: &str) -> Result<()> {
        let mut assignment = assignment.clone();
        assignment.status = Some(message.to_string());
        self.store.write(assignment.clone(), None).await?;

        let mut session = self
            .read_session(&assignment.project_id, &assignment.brain_id, &assignment.session_id)
            .await?;
        session.status = Some(message.to_string());
        self.store.write(session, None).await?;
        Ok(())
    }

    /// `RecordAssignmentDone` (spec.md §4.3): clears any error status and
    /// releases the lease; called once a processor reaches `Finished`.
    pub async fn record_assignment_done(&self, assignment: &Assignment) -> Result<()> {
        self.release_assignment(assignment).await
    }

    /// `CreateSessionAndAssignment` (spec.md §4.3, §4.7 "manual-assignment
    /// mode"): writes a fresh `Session` and `Assignment` pair, bypassing the
    /// monitor queue entirely, for direct local invocation via
    /// `falken-cli run --assignment`.
    pub async fn create_session_and_assignment(
        &self,
        project: &str,
        brain: &str,
        session_id: &str,
        session_type: SessionType,
        starting_snapshots: Vec<String>,
        assignment_id: &str,
    ) -> Result<Assignment> {
        let now = now_micros();
        let session = Session {
            project_id: project.to_string(),
            brain_id: brain.to_string(),
            session_id: session_id.to_string(),
            session_type,
            starting_snapshots,
            user_agent: "falken-learner".to_string(),
            created_micros: now,
            last_data_received_micros: 0,
            last_demo_data_received_micros: 0,
            ended_micros: 0,
            status: None,
        };
        self.store.write(session, None).await?;

        let assignment = Assignment {
            project_id: project.to_string(),
            brain_id: brain.to_string(),
            session_id: session_id.to_string(),
            assignment_id: assignment_id.to_string(),
            progress: Some(Progress {
                training_fraction: None,
                most_recent_demo_micros: 0,
            }),
            status: None,
        };
        self.store.write(assignment.clone(), None).await?;
        Ok(assignment)
    }

    /// Resolves the snapshot a `StopSession` call should point its caller
    /// at (spec.md §9 supplemented feature "Snapshot resolution on
    /// StopSession"), grounded in `stop_session_handler.py`. The table
    /// (spec.md §6):
    ///
    /// - `Inference`: the session's single starting snapshot, unchanged.
    /// - `InteractiveTraining` / `Evaluation`: a freshly minted snapshot
    ///   pointing at `selected_model`, merging every starting snapshot's
    ///   ancestor DAG; if no model was selected, the session's own single
    ///   starting snapshot is reused instead (no training occurred).
    pub async fn resolve_stop_snapshot(
        &self,
        project: &str,
        brain: &str,
        session: &Session,
        selected_model: Option<&Model>,
    ) -> Result<String> {
        match session.session_type {
            SessionType::Inference => match session.starting_snapshots.as_slice() {
                [only] => Ok(only.clone()),
                other => Err(Error::InvalidArgument(format!(
                    "inference session must have exactly one starting snapshot, found {}",
                    other.len()
                ))),
            },
            SessionType::InteractiveTraining | SessionType::Evaluation => {
                self.create_or_reuse_snapshot(project, brain, session, selected_model)
                    .await
            }
        }
    }

    async fn create_or_reuse_snapshot(
        &self,
        project: &str,
        brain: &str,
        session: &Session,
        selected_model: Option<&Model>,
    ) -> Result<String> {
        let Some(model) = selected_model else {
            return session
                .starting_snapshots
                .first()
                .cloned()
                .ok_or_else(|| Error::InvalidArgument(
                    "session has no starting snapshot and no model was selected".to_string(),
                ));
        };

        let mut starting = Vec::with_capacity(session.starting_snapshots.len());
        for snapshot_id in &session.starting_snapshots {
            starting.push(self.read_snapshot(project, brain, snapshot_id).await?);
        }

        let new_snapshot_id = Uuid::new_v4().to_string();
        let ancestor_snapshots: Vec<SnapshotParents> =
            Snapshot::build_ancestor_snapshots(&new_snapshot_id, &starting);

        let snapshot = Snapshot {
            project_id: project.to_string(),
            brain_id: brain.to_string(),
            snapshot_id: new_snapshot_id.clone(),
            session_id: session.session_id.clone(),
            model_id: model.model_id.clone(),
            model_path: model.model_path.clone(),
            ancestor_snapshots,
        };
        self.store.write(snapshot, None).await?;
        Ok(new_snapshot_id)
    }
}
