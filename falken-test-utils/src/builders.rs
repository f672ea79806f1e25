//! Minimal-boilerplate constructors for the record types, so a processor or
//! storage test can write `chunk("e0", 0).build()` instead of spelling out
//! every field of [`EpisodeChunk`] by hand.

use falken_core::{
    ActionSource, Assignment, EpisodeChunk, EpisodeState, Progress, Session, SessionType, Step,
};
use serde_json::{json, Value};

/// A brain spec with one player entity (position + rotation) and a single
/// two-way categorical action, good enough for any test that only cares
/// about the surrounding plumbing rather than the schema itself.
pub fn minimal_brain_spec() -> falken_core::BrainSpec {
    use falken_core::brainspec::{ActionSpec, ActionTypeSpec, CategorySpec, EntitySpec, LeafSpec, ObservationSpec};
    falken_core::BrainSpec::new(
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
    .expect("minimal_brain_spec is valid by construction")
}

fn observation() -> Value {
    json!({ "player": { "position": [0.0, 0.0, 0.0], "rotation": [0.0, 0.0, 0.0, 1.0] } })
}

fn action() -> Value {
    json!({ "move": 0 })
}

/// Builds a [`Step`] at a given offset into an episode. `timestamp_micros`
/// increases with `index` so ordering assertions have something to check.
pub fn step(index: u32, source: ActionSource) -> Step {
    Step {
        observation: observation(),
        action: action(),
        reward: 0.0,
        source,
        timestamp_micros: 1_000_000 + index as i64 * 1_000,
    }
}

/// Builder for an [`EpisodeChunk`], defaulting to a single in-progress
/// demonstration step; chain the setters to shape it for a specific test.
pub struct ChunkBuilder {
    chunk: EpisodeChunk,
}

impl ChunkBuilder {
    pub fn new(project: &str, brain: &str, session: &str, episode: &str, chunk_id: u32) -> Self {
        ChunkBuilder {
            chunk: EpisodeChunk {
                project_id: project.into(),
                brain_id: brain.into(),
                session_id: session.into(),
                episode_id: episode.into(),
                chunk_id,
                steps: vec![step(0, ActionSource::HumanDemonstration)],
                episode_state: EpisodeState::InProgress,
            },
        }
    }

    pub fn steps(mut self, steps: Vec<Step>) -> Self {
        self.chunk.steps = steps;
        self
    }

    pub fn episode_state(mut self, state: EpisodeState) -> Self {
        self.chunk.episode_state = state;
        self
    }

    pub fn build(self) -> EpisodeChunk {
        self.chunk
    }
}

pub fn chunk(project: &str, brain: &str, session: &str, episode: &str, chunk_id: u32) -> ChunkBuilder {
    ChunkBuilder::new(project, brain, session, episode, chunk_id)
}

/// Builder for a [`Session`], defaulting to a brand-new `InteractiveTraining`
/// session that has not yet received any data.
pub struct SessionBuilder {
    session: Session,
}

impl SessionBuilder {
    pub fn new(project: &str, brain: &str, session_id: &str) -> Self {
        SessionBuilder {
            session: Session {
                project_id: project.into(),
                brain_id: brain.into(),
                session_id: session_id.into(),
                session_type: SessionType::InteractiveTraining,
                starting_snapshots: vec![],
                user_agent: "falken-test-utils".into(),
                created_micros: 1_000_000,
                last_data_received_micros: 0,
                last_demo_data_received_micros: 0,
                ended_micros: 0,
                status: None,
            },
        }
    }

    pub fn session_type(mut self, session_type: SessionType) -> Self {
        self.session.session_type = session_type;
        self
    }

    pub fn starting_snapshots(mut self, snapshots: Vec<String>) -> Self {
        self.session.starting_snapshots = snapshots;
        self
    }

    pub fn last_data_received_micros(mut self, micros: i64) -> Self {
        self.session.last_data_received_micros = micros;
        self
    }

    pub fn ended_micros(mut self, micros: i64) -> Self {
        self.session.ended_micros = micros;
        self
    }

    pub fn build(self) -> Session {
        self.session
    }
}

pub fn session(project: &str, brain: &str, session_id: &str) -> SessionBuilder {
    SessionBuilder::new(project, brain, session_id)
}

/// Builds an [`Assignment`] with `"default"` hyperparameters and no progress
/// recorded yet.
pub fn assignment(project: &str, brain: &str, session_id: &str, assignment_id: &str) -> Assignment {
    Assignment {
        project_id: project.into(),
        brain_id: brain.into(),
        session_id: session_id.into(),
        assignment_id: assignment_id.into(),
        progress: Some(Progress { training_fraction: None, most_recent_demo_micros: 0 }),
        status: None,
    }
}
