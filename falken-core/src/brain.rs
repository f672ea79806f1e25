//! The brain entity: a schema pair plus its trained policies (spec.md §3).

use crate::brainspec::BrainSpec;
use serde::{Deserialize, Serialize};

/// A brain owns a [`BrainSpec`] and is immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brain {
    pub project_id: String,
    pub brain_id: String,
    pub brain_spec: BrainSpec,
}
