//! Episode chunks, steps, and the steps-type lattice (spec.md §3, §4.1
//! "Invariants", grounded in `submit_episode_chunks_handler.py`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSource {
    HumanDemonstration,
    BrainAction,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeState {
    InProgress,
    Success,
    Failure,
    Aborted,
    GaveUp,
    Unspecified,
}

impl EpisodeState {
    /// A chunk's `episode_state` is terminal when it is not `InProgress` or
    /// `Unspecified` (spec.md §3 invariant 3).
    pub fn is_terminal(self) -> bool {
        !matches!(self, EpisodeState::InProgress | EpisodeState::Unspecified)
    }

    /// Whether an episode in this state is complete enough to be scored
    /// (`_episode_complete` in the original implementation: `Aborted` and
    /// `Unspecified` episodes are terminal but unscored).
    pub fn is_complete(self) -> bool {
        matches!(
            self,
            EpisodeState::Success | EpisodeState::Failure | EpisodeState::GaveUp
        )
    }

    /// `EPISODE_SCORE_SUCCESS` / `EPISODE_SCORE_FAILURE` (spec.md §3,
    /// `model_selector.py`). `None` for states that cannot be scored.
    pub fn score(self) -> Option<i32> {
        match self {
            EpisodeState::Success => Some(1),
            EpisodeState::Failure | EpisodeState::GaveUp => Some(-1),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub observation: Value,
    pub action: Value,
    pub reward: f64,
    pub source: ActionSource,
    pub timestamp_micros: i64,
}

/// The lattice-joined label of an episode's action sources (spec.md
/// GLOSSARY "Steps type"):
///
/// ```text
///                  MIXED
///                 |     |
///    ONLY_INFERENCES    ONLY_DEMONSTRATIONS
///                 |     |
///                 UNKNOWN
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepsType {
    Unknown,
    OnlyDemonstrations,
    OnlyInferences,
    Mixed,
}

impl StepsType {
    /// Computes the steps type of a single chunk from its steps' action
    /// sources (`_get_steps_type` in the original implementation).
    pub fn of_steps(steps: &[Step]) -> Self {
        let mut seen_demo = false;
        let mut seen_inference = false;
        for step in steps {
            match step.source {
                ActionSource::HumanDemonstration => seen_demo = true,
                ActionSource::BrainAction | ActionSource::None => seen_inference = true,
            }
            if seen_demo && seen_inference {
                return StepsType::Mixed;
            }
        }
        if seen_demo {
            StepsType::OnlyDemonstrations
        } else if seen_inference {
            StepsType::OnlyInferences
        } else {
            StepsType::Unknown
        }
    }

    /// The lattice join (least upper bound) of two steps types
    /// (`_merge_steps_types` in the original implementation).
    pub fn merge(self, other: Self) -> Self {
        if self == other {
            return self;
        }
        if self == StepsType::Unknown {
            return other;
        }
        if other == StepsType::Unknown {
            return self;
        }
        StepsType::Mixed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeChunk {
    pub project_id: String,
    pub brain_id: String,
    pub session_id: String,
    pub episode_id: String,
    pub chunk_id: u32,
    pub steps: Vec<Step>,
    pub episode_state: EpisodeState,
}

impl EpisodeChunk {
    /// Checks the empty-chunk rules (spec.md §3): an empty step list is
    /// permitted only as a terminal chunk closing the episode; `chunk_id=0`
    /// may never be both empty and terminal (an empty episode).
    pub fn check_invariants(&self) -> Result<()> {
        if self.steps.is_empty() {
            if !self.episode_state.is_terminal() {
                return Err(Error::Typing(format!(
                    "episode {} chunk {} is empty but does not close the episode",
                    self.episode_id, self.chunk_id
                )));
            }
            if self.chunk_id == 0 {
                return Err(Error::Typing(format!(
                    "episode {} has an empty episode at chunk 0",
                    self.episode_id
                )));
            }
        }
        Ok(())
    }

    pub fn steps_type(&self) -> StepsType {
        StepsType::of_steps(&self.steps)
    }
}
