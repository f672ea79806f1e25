//! Offline and online evaluation records (spec.md §3).

use serde::{Deserialize, Serialize};

/// `(model_id, offline_evaluation_id) -> score`. Multiple evaluations per
/// model are retained so scores stay comparable across incrementally
/// growing eval sets (spec.md §3, §4.4.6 step 3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineEvaluation {
    pub project_id: String,
    pub brain_id: String,
    pub session_id: String,
    pub model_id: String,
    pub offline_evaluation_id: String,
    pub score: f64,
}

/// Per-episode score attributed to the model that produced the episode's
/// inference actions, used for post-training model selection (spec.md §3,
/// GLOSSARY).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineEvaluation {
    pub project_id: String,
    pub brain_id: String,
    pub session_id: String,
    pub episode_id: String,
    pub model_id: String,
    /// +1 for a successful episode, -1 for a failed or given-up one
    /// (spec.md GLOSSARY; `EpisodeState::score`).
    pub score: i32,
}
