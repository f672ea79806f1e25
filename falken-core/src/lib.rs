//! Resource IDs, data model, hyperparameter surface, and brain spec
//! validation shared by every other crate in the Falken training
//! coordination core.

pub mod assignment;
pub mod brain;
pub mod brainspec;
pub mod episode;
pub mod error;
pub mod evaluation;
pub mod hparams;
pub mod project;
pub mod resource_id;
pub mod session;
pub mod snapshot;
pub mod timestamp;
pub mod trained_model;

pub use assignment::{Assignment, Progress};
pub use brain::Brain;
pub use brainspec::BrainSpec;
pub use episode::{ActionSource, EpisodeChunk, EpisodeState, Step, StepsType};
pub use error::{Error, Result};
pub use evaluation::{OfflineEvaluation, OnlineEvaluation};
pub use hparams::Hyperparameters;
pub use project::Project;
pub use resource_id::ResourceId;
pub use session::{Session, SessionState, SessionType};
pub use snapshot::{Snapshot, SnapshotParents};
pub use trained_model::Model;
