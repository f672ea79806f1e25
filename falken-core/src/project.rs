//! The root entity of the resource hierarchy (spec.md §3).

use serde::{Deserialize, Serialize};

/// A project is identifier-only; every other entity nests under one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
}
