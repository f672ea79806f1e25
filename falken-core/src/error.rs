//! Error taxonomy for the data model, resource IDs, hyperparameter parsing,
//! and brain spec validation (spec.md §7).

/// Result type alias used throughout `falken-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building resource IDs, validating brain specs, or
/// parsing assignment hyperparameters.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A submitted chunk or step failed type validation against a `BrainSpec`.
    #[error("typing error: {0}")]
    Typing(String),

    /// A `BrainSpec` failed its own internal validation rules.
    #[error("invalid brain spec: {0}")]
    InvalidSpec(String),

    /// The assignment id could not be parsed into a hyperparameter overlay.
    #[error("hparam error: {0}")]
    HParam(String),

    /// A resource id was malformed (e.g. missing a required path segment).
    #[error("malformed resource id: {0}")]
    MalformedResourceId(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
