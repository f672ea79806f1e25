//! The assignment entity: a training job within a session (spec.md §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Training fraction completed, e.g. `training_examples_done /
    /// max_train_examples`, when the assignment has a bounded budget.
    pub training_fraction: Option<f64>,
    pub most_recent_demo_micros: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub project_id: String,
    pub brain_id: String,
    pub session_id: String,
    /// The raw assignment id string: `"default"` or a JSON object of
    /// hyperparameter overrides (spec.md §3). The hashed form is only used
    /// as a filesystem path segment, never stored as the semantic id.
    pub assignment_id: String,
    pub progress: Option<Progress>,
    pub status: Option<String>,
}
