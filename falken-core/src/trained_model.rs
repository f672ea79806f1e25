//! A saved policy produced during training (spec.md §3). Named `Model` but
//! kept in `trained_model` to avoid clashing with Rust's `model` keyword-ish
//! naming conventions elsewhere in the workspace.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub project_id: String,
    pub brain_id: String,
    pub session_id: String,
    pub model_id: String,
    /// The assignment that produced this model.
    pub assignment_id: String,
    /// The `(episode_id, chunk_id)` boundary at which this model was saved
    /// (spec.md §3 invariant 4): the last training sample it was exposed to.
    pub episode_id: String,
    pub chunk_id: u32,
    /// Path to the uncompressed SavedModel + TF-Lite directory.
    pub model_path: String,
    /// Path to the zipped archive of the same directory.
    pub zip_path: String,
    pub training_examples_completed: u64,
    pub max_training_examples: Option<u64>,
    pub most_recent_demo_micros: i64,
}
