//! Maps each `falken-core` entity onto the [`ResourceId`] it is stored
//! under. Kept separate from the entities themselves so the data model
//! stays free of storage concerns (spec.md §3 describes entities as plain
//! data; the path layout is a §4.1 storage concern).

use falken_core::{
    Assignment, Brain, EpisodeChunk, Model, OfflineEvaluation, OnlineEvaluation, Project,
    ResourceId, Session, Snapshot,
};

/// Implemented by every entity that can be written through a
/// [`crate::resource_store::ResourceStore`].
pub trait Keyed {
    fn resource_id(&self) -> ResourceId;
}

impl Keyed for Project {
    fn resource_id(&self) -> ResourceId {
        ResourceId::project(&self.project_id)
    }
}

impl Keyed for Brain {
    fn resource_id(&self) -> ResourceId {
        ResourceId::brain(&self.project_id, &self.brain_id)
    }
}

impl Keyed for Session {
    fn resource_id(&self) -> ResourceId {
        ResourceId::session(&self.project_id, &self.brain_id, &self.session_id)
    }
}

impl Keyed for EpisodeChunk {
    fn resource_id(&self) -> ResourceId {
        ResourceId::chunk(
            &self.project_id,
            &self.brain_id,
            &self.session_id,
            &self.episode_id,
            &self.chunk_id.to_string(),
        )
    }
}

impl Keyed for Assignment {
    fn resource_id(&self) -> ResourceId {
        ResourceId::assignment(
            &self.project_id,
            &self.brain_id,
            &self.session_id,
            &self.assignment_id,
        )
    }
}

impl Keyed for Snapshot {
    fn resource_id(&self) -> ResourceId {
        ResourceId::snapshot(&self.project_id, &self.brain_id, &self.snapshot_id)
    }
}

impl Keyed for Model {
    fn resource_id(&self) -> ResourceId {
        ResourceId::model(
            &self.project_id,
            &self.brain_id,
            &self.session_id,
            &self.model_id,
        )
    }
}

impl Keyed for OfflineEvaluation {
    fn resource_id(&self) -> ResourceId {
        ResourceId::offline_evaluation(
            &self.project_id,
            &self.brain_id,
            &self.session_id,
            &self.model_id,
            &self.offline_evaluation_id,
        )
    }
}

impl Keyed for OnlineEvaluation {
    fn resource_id(&self) -> ResourceId {
        ResourceId::online_evaluation(
            &self.project_id,
            &self.brain_id,
            &self.session_id,
            &self.episode_id,
        )
    }
}
