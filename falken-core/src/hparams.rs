//! Hyperparameter resolution (spec.md §4.4.1, §9 "Hyperparameter surface").
//!
//! Rather than a dynamic dictionary, the effective hyperparameters are a
//! concrete struct. Construction still goes through a `serde_json::Map`
//! merge so that the overlap/unknown-key checks the original Python
//! implementation performs on a plain dict translate directly, but the
//! result handed to the rest of the crate is always fully typed.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The effective hyperparameters for one assignment: the brain's defaults,
/// overlaid with the learner's fixed defaults, overlaid with the
/// assignment id's JSON overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    // -- Brain hyperparameters --
    pub batch_size: u32,
    pub learning_rate: f64,
    /// Total training examples consumed by a single `brain.train()` call.
    /// `training_steps` is derived from this and `batch_size`.
    pub training_examples: u64,
    pub policy_type: String,
    /// Opaque network configuration, passed through to the brain unchanged.
    #[serde(default)]
    pub network: Value,

    // -- Learner hyperparameters (spec.md §4.4.1 fixed defaults) --
    pub continuous: bool,
    pub save_interval_batches: Option<u64>,
    pub min_train_examples: Option<u64>,
    pub max_train_examples: Option<u64>,
    pub synchronous_export: bool,
}

impl Hyperparameters {
    /// `training_steps = ceil(training_examples / batch_size)` (spec.md
    /// §4.4.1 derived fields).
    pub fn training_steps(&self) -> u64 {
        div_ceil(self.training_examples, self.batch_size as u64)
    }

    /// Minimum number of `brain.train()` batches before a restart or
    /// termination may proceed, or `None` if unrestricted (spec.md §4.4.3
    /// step 1, §4.4.5).
    pub fn min_train_batches(&self) -> Option<u64> {
        self.min_train_examples
            .map(|examples| examples / self.batch_size as u64)
    }

    /// Maximum number of training batches allowed before forced termination
    /// (spec.md §4.4.5), or `None` if unbounded.
    pub fn max_train_batches(&self) -> Option<u64> {
        self.max_train_examples
            .map(|examples| examples / self.batch_size as u64)
    }
}

fn div_ceil(numerator: u64, denominator: u64) -> u64 {
    if denominator == 0 {
        0
    } else {
        (numerator + denominator - 1) / denominator
    }
}

/// The learner's fixed hyperparameter defaults (spec.md §4.4.1), expressed
/// as a JSON object so it can be merged with the brain's defaults using the
/// same machinery as assignment overrides.
fn learner_defaults() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("continuous".into(), Value::Bool(true));
    map.insert("save_interval_batches".into(), Value::from(20_000u64));
    map.insert("min_train_examples".into(), Value::Null);
    map.insert("max_train_examples".into(), Value::Null);
    map.insert("synchronous_export".into(), Value::Bool(false));
    map
}

/// Parses the assignment id into a JSON object of hyperparameter overrides
/// (spec.md §3, §4.4.1). `"default"` maps to no overrides; anything else
/// must decode to a JSON object.
pub fn parse_assignment_overrides(assignment_id: &str) -> Result<Map<String, Value>> {
    if assignment_id == "default" {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(assignment_id) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::HParam(format!(
            "assignment id must decode to a JSON object: {assignment_id}"
        ))),
        Err(error) => Err(Error::HParam(format!(
            "failed to parse assignment id: {error}\n{assignment_id}"
        ))),
    }
}

/// Resolves the effective hyperparameters for an assignment (spec.md
/// §4.4.1): brain defaults, overlaid with learner defaults (rejecting
/// overlap), overlaid with the assignment's parsed overrides (rejecting
/// unknown keys).
pub fn resolve(brain_defaults: &Map<String, Value>, assignment_id: &str) -> Result<Hyperparameters> {
    let mut merged = brain_defaults.clone();
    let learner = learner_defaults();
    for key in learner.keys() {
        if merged.contains_key(key) {
            return Err(Error::HParam(format!(
                "learner hparam overlaps with brain hparam: {key}"
            )));
        }
    }
    merged.extend(learner);

    let overrides = parse_assignment_overrides(assignment_id)?;
    for key in overrides.keys() {
        if !merged.contains_key(key) {
            return Err(Error::HParam(format!("unknown hparam in assignment: {key}")));
        }
    }
    merged.extend(overrides);

    serde_json::from_value(Value::Object(merged)).map_err(Error::Serialization)
}

/// The brain's built-in hyperparameter defaults (spec.md §4.4.1). Concrete
/// brain implementations may override this; the values here match the
/// reference `FakeBrain` used in tests and the fixed-seed trainer.
pub fn default_brain_hparams() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("batch_size".into(), Value::from(32u64));
    map.insert("learning_rate".into(), Value::from(3e-4));
    map.insert("training_examples".into(), Value::from(100_000u64));
    map.insert("policy_type".into(), Value::from("continuous"));
    map.insert("network".into(), Value::Object(Map::new()));
    map
}
