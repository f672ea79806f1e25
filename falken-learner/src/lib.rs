//! The learner crate (spec.md §4): the storage façade, the brain adapter
//! trait and its process-wide cache, the model-selection policies, the
//! checkpoint exporter, the episode-chunk fetcher, the per-assignment
//! scratch layout, the `AssignmentProcessor` state machine, and the outer
//! `LearnerDriver` loop that ties them together.

pub mod brain;
pub mod brain_cache;
pub mod driver;
pub mod error;
pub mod exporter;
pub mod fetcher;
pub mod model_manager;
pub mod processor;
pub mod scratch;
pub mod storage;

pub use brain::{Brain, BrainHandle, BrainHparams, EvalScore, SharedBrain, StepPhase};
pub use brain_cache::{BrainCache, BrainFactory};
pub use driver::{ErrorListener, LearnerDriver};
pub use error::{Error, Result};
pub use exporter::{ExportRequest, ModelExporter};
pub use fetcher::DataFetcher;
pub use model_manager::{
    ModelRecord, ModelSelectionPolicy, SimpleBestScorePolicy, UcbModelSelectionPolicy,
    MAXIMUM_NUMBER_OF_MODELS_TO_ONLINE_EVAL, NO_BETTER_MODEL_IN_N_SAVES, NUM_ONLINE_EVALS_PER_MODEL,
    UCB_SAMPLING_CONFIDENCE,
};
pub use processor::{AssignmentProcessor, ProcessorConfig, ProcessorEvent};
pub use scratch::ScratchLayout;
pub use storage::Storage;
