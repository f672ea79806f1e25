//! Brain observation/action spec tree and data validation (spec.md §4.5).
//!
//! The original implementation drives validation and proto-to-tensor
//! conversion through runtime type tags on protobuf messages. There are no
//! protos here: the spec tree is a plain tagged variant
//! ([`SpecNode`]) and a single recursive visitor (`validate`) replaces the
//! reflection-driven dispatch.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Reserved entity field names that may not be reused by custom fields
/// (spec.md §4.5).
const ENTITY_RESERVED_FIELDS: [&str; 2] = ["position", "rotation"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberSpec {
    pub minimum: f64,
    pub maximum: f64,
}

impl NumberSpec {
    fn validate(&self, path: &str) -> Result<()> {
        if !(self.minimum < self.maximum) {
            return Err(Error::InvalidSpec(format!(
                "{path} has invalid or missing range: [{}, {}]",
                self.minimum, self.maximum
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpec {
    pub values: Vec<String>,
}

impl CategorySpec {
    fn validate(&self, path: &str) -> Result<()> {
        if self.values.len() < 2 {
            return Err(Error::InvalidSpec(format!(
                "{path} has less than two categories: {:?}",
                self.values
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeelerSpec {
    pub count: u32,
    pub distance: NumberSpec,
    pub yaw_angles: Vec<f64>,
    #[serde(default)]
    pub experimental_data: Vec<NumberSpec>,
}

impl FeelerSpec {
    fn validate(&self, path: &str) -> Result<()> {
        if self.count < 1 {
            return Err(Error::InvalidSpec(format!(
                "{path} has feeler count {}, requires at least 1",
                self.count
            )));
        }
        self.distance.validate(&format!("{path}/distance"))?;
        if self.yaw_angles.len() as u32 != self.count {
            return Err(Error::InvalidSpec(format!(
                "{path} has {} yaw_angles that mismatch feeler count {}",
                self.yaw_angles.len(),
                self.count
            )));
        }
        for (i, measure) in self.experimental_data.iter().enumerate() {
            measure.validate(&format!("{path}/experimental_data[{i}]"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoystickAxesMode {
    DirectionXz,
    DeltaPitchYaw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoystickSpec {
    pub axes_mode: Option<JoystickAxesMode>,
    pub controlled_entity: String,
    /// Only valid when `axes_mode == DirectionXz` (spec.md §4.5).
    #[serde(default)]
    pub control_frame: Option<String>,
}

impl JoystickSpec {
    fn validate(&self, path: &str) -> Result<()> {
        let Some(axes_mode) = self.axes_mode else {
            return Err(Error::InvalidSpec(format!("{path} has undefined axes_mode")));
        };
        if self.controlled_entity.is_empty() {
            return Err(Error::InvalidSpec(format!("{path} has no controlled_entity")));
        }
        if self.control_frame.is_some() && axes_mode != JoystickAxesMode::DirectionXz {
            return Err(Error::InvalidSpec(format!(
                "{path} has a control_frame set; control_frame should only be set \
                 if axes_mode is DirectionXz, axes_mode is currently {axes_mode:?}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityFieldSpec {
    pub name: String,
    pub value: LeafSpec,
}

/// The leaf node types that can terminate an observation, entity field, or
/// action (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LeafSpec {
    Category(CategorySpec),
    Number(NumberSpec),
    Position,
    Rotation,
    Feeler(FeelerSpec),
    Joystick(JoystickSpec),
}

impl LeafSpec {
    fn validate(&self, path: &str) -> Result<()> {
        match self {
            LeafSpec::Category(spec) => spec.validate(path),
            LeafSpec::Number(spec) => spec.validate(path),
            LeafSpec::Position | LeafSpec::Rotation => Ok(()),
            LeafSpec::Feeler(spec) => spec.validate(path),
            LeafSpec::Joystick(spec) => spec.validate(path),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            LeafSpec::Category(_) => "category",
            LeafSpec::Number(_) => "number",
            LeafSpec::Position => "position",
            LeafSpec::Rotation => "rotation",
            LeafSpec::Feeler(_) => "feeler",
            LeafSpec::Joystick(_) => "joystick",
        }
    }
}

/// A named entity: an optional built-in `position`/`rotation` plus any
/// number of uniquely-named custom fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    pub name: String,
    #[serde(default)]
    pub has_position: bool,
    #[serde(default)]
    pub has_rotation: bool,
    #[serde(default)]
    pub fields: Vec<EntityFieldSpec>,
}

impl EntitySpec {
    fn validate(&self) -> Result<()> {
        let path = format!("entity[{}]", self.name);
        let mut seen = HashSet::new();
        for (i, field) in self.fields.iter().enumerate() {
            let field_path = format!("{path}/entity_field[{i}]");
            if field.name.is_empty() {
                return Err(Error::InvalidSpec(format!("{field_path} has no name")));
            }
            if ENTITY_RESERVED_FIELDS.contains(&field.name.as_str()) {
                return Err(Error::InvalidSpec(format!(
                    "{field_path} has reserved name \"{}\"",
                    field.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::InvalidSpec(format!(
                    "{field_path} has name \"{}\" that already exists in {path}",
                    field.name
                )));
            }
            field.value.validate(&field_path)?;
        }
        Ok(())
    }

    fn has_position_and_rotation(&self) -> bool {
        self.has_position && self.has_rotation
    }
}

/// The observation schema: an optional `player` and `camera` entity plus any
/// number of named global entities (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSpec {
    #[serde(default)]
    pub player: Option<EntitySpec>,
    #[serde(default)]
    pub camera: Option<EntitySpec>,
    #[serde(default)]
    pub global_entities: Vec<EntitySpec>,
}

impl ObservationSpec {
    fn validate(&self) -> Result<()> {
        if self.player.is_none() && self.global_entities.is_empty() {
            return Err(Error::InvalidSpec(
                "observation_spec must contain at least one non-camera entity".into(),
            ));
        }
        if let Some(player) = &self.player {
            player.validate()?;
        }
        if let Some(camera) = &self.camera {
            camera.validate()?;
        }
        for entity in &self.global_entities {
            entity.validate()?;
        }
        Ok(())
    }

    fn entity_by_name(&self, name: &str) -> Option<&EntitySpec> {
        [&self.player, &self.camera]
            .into_iter()
            .flatten()
            .chain(self.global_entities.iter())
            .find(|entity| entity.name == name)
    }
}

/// A single named action (spec.md §4.5): the built-in leaf types plus
/// `Joystick`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTypeSpec {
    pub name: String,
    pub action: LeafSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub actions: Vec<ActionTypeSpec>,
}

impl ActionSpec {
    fn validate(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(Error::InvalidSpec("action_spec is empty".into()));
        }
        let mut seen = HashSet::new();
        for (i, action) in self.actions.iter().enumerate() {
            let path = format!("actions[{i}]");
            if action.name.is_empty() {
                return Err(Error::InvalidSpec(format!("{path} has no name")));
            }
            if !seen.insert(action.name.as_str()) {
                return Err(Error::InvalidSpec(format!(
                    "{path} has duplicate name \"{}\"",
                    action.name
                )));
            }
            action.action.validate(&format!("{path}/{}", action.name))?;
        }
        Ok(())
    }

    /// Every joystick reference must resolve to an entity with both a
    /// position and a rotation (spec.md §4.5). References may only name
    /// `player` or `camera`.
    fn validate_joystick_references(&self, observations: &ObservationSpec) -> Result<()> {
        for action in &self.actions {
            let LeafSpec::Joystick(joystick) = &action.action else {
                continue;
            };
            let mut references = vec![joystick.controlled_entity.as_str()];
            if let Some(control_frame) = &joystick.control_frame {
                references.push(control_frame.as_str());
            }
            for reference in references {
                if reference != "player" && reference != "camera" {
                    return Err(Error::InvalidSpec(format!(
                        "joystick \"{}\" references invalid entity \"{reference}\"",
                        action.name
                    )));
                }
                let entity = observations.entity_by_name(reference).ok_or_else(|| {
                    Error::InvalidSpec(format!(
                        "missing entity \"{reference}\" referenced by joystick \"{}\"",
                        action.name
                    ))
                })?;
                if !entity.has_position_and_rotation() {
                    return Err(Error::InvalidSpec(format!(
                        "entity \"{reference}\" referenced by joystick \"{}\" has no \
                         position or rotation",
                        action.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A brain's full observation and action schema (spec.md §4.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrainSpec {
    pub observation_spec: ObservationSpec,
    pub action_spec: ActionSpec,
}

impl BrainSpec {
    /// Parses and validates a `BrainSpec`, matching `BrainSpec.__init__` /
    /// `validate_joystick_references` in the original implementation.
    pub fn new(observation_spec: ObservationSpec, action_spec: ActionSpec) -> Result<Self> {
        observation_spec.validate()?;
        action_spec.validate()?;
        action_spec.validate_joystick_references(&observation_spec)?;
        Ok(BrainSpec {
            observation_spec,
            action_spec,
        })
    }
}

/// Minimal shape used to type-check submitted observation/action data
/// without re-deriving the whole spec tree (spec.md §4.5 "Data validation").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LeafValue {
    Category { value: i64 },
    Number { value: f64 },
    Position,
    Rotation,
    Feeler { measurements: Vec<FeelerMeasurement> },
    Joystick { x_axis: f64, y_axis: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeelerMeasurement {
    pub distance: f64,
    #[serde(default)]
    pub experimental_data: Vec<f64>,
}

/// Checks a submitted leaf value against its spec (spec.md §4.5 "Data
/// validation (per submitted chunk) type-checks every field against this
/// schema; failure raises `TypingError` and aborts the submission").
pub fn check_leaf(value: &LeafValue, spec: &LeafSpec, path: &str) -> Result<()> {
    match (value, spec) {
        (LeafValue::Category { value }, LeafSpec::Category(spec)) => {
            let max = spec.values.len() as i64 - 1;
            if *value < 0 || *value > max {
                return Err(Error::Typing(format!(
                    "{path} category has value {value} that is out of range [0, {max}]"
                )));
            }
        }
        (LeafValue::Number { value }, LeafSpec::Number(spec)) => {
            if *value < spec.minimum || *value > spec.maximum {
                return Err(Error::Typing(format!(
                    "{path} number has value {value} that is out of range \
                     [{}, {}]",
                    spec.minimum, spec.maximum
                )));
            }
        }
        (LeafValue::Position, LeafSpec::Position) | (LeafValue::Rotation, LeafSpec::Rotation) => {}
        (LeafValue::Feeler { measurements }, LeafSpec::Feeler(spec)) => {
            if measurements.len() as u32 != spec.count {
                return Err(Error::Typing(format!(
                    "{path} feeler has {} measurements vs. expected {}",
                    measurements.len(),
                    spec.count
                )));
            }
            for (i, measurement) in measurements.iter().enumerate() {
                if measurement.distance < spec.distance.minimum
                    || measurement.distance > spec.distance.maximum
                {
                    return Err(Error::Typing(format!(
                        "{path} measurements[{i}]/distance has value {} out of range",
                        measurement.distance
                    )));
                }
                if measurement.experimental_data.len() != spec.experimental_data.len() {
                    return Err(Error::Typing(format!(
                        "{path} measurements[{i}] has {} experimental_data vs. expected {}",
                        measurement.experimental_data.len(),
                        spec.experimental_data.len()
                    )));
                }
                for (j, (datum, datum_spec)) in measurement
                    .experimental_data
                    .iter()
                    .zip(spec.experimental_data.iter())
                    .enumerate()
                {
                    if *datum < datum_spec.minimum || *datum > datum_spec.maximum {
                        return Err(Error::Typing(format!(
                            "{path} measurements[{i}]/experimental_data[{j}] has value \
                             {datum} out of range"
                        )));
                    }
                }
            }
        }
        (LeafValue::Joystick { x_axis, y_axis }, LeafSpec::Joystick(_)) => {
            for (axis_name, axis_value) in [("x_axis", *x_axis), ("y_axis", *y_axis)] {
                if !(-1.0..=1.0).contains(&axis_value) {
                    return Err(Error::Typing(format!(
                        "{path} joystick {axis_name} value {axis_value} is out of range [-1.0, 1.0]"
                    )));
                }
            }
        }
        _ => {
            return Err(Error::Typing(format!(
                "{path} data \"{}\" does not match spec \"{}\"",
                value_type_name(value),
                spec.type_name()
            )))
        }
    }
    Ok(())
}

fn value_type_name(value: &LeafValue) -> &'static str {
    match value {
        LeafValue::Category { .. } => "category",
        LeafValue::Number { .. } => "number",
        LeafValue::Position => "position",
        LeafValue::Rotation => "rotation",
        LeafValue::Feeler { .. } => "feeler",
        LeafValue::Joystick { .. } => "joystick",
    }
}
