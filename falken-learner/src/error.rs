//! Error taxonomy for assignment processing, model export, and the learner
//! driver (spec.md §7).

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The fetcher's first query never completed within
    /// `_WAIT_FOR_DATA_BRAIN_SECS` (spec.md §4.4.4, §7).
    #[error("could not query the store for chunks within the wait window")]
    NoData,

    /// The processor's wall-clock budget for a single assignment was
    /// exceeded (spec.md §4.4.3 step 2, §7). The message is surfaced
    /// verbatim onto the assignment and session status fields.
    #[error("Assignment took too long. Started {elapsed_secs} seconds ago.")]
    ExceededMaxWorkTime { elapsed_secs: f64 },

    /// A save was attempted after the model exporter had already shut down
    /// (spec.md §7 "programmer error; assertion").
    #[error("model exporter is no longer accepting exports")]
    InactiveExporter,

    /// A stop-snapshot resolution request was malformed for its session
    /// type (spec.md §9 "Snapshot resolution on StopSession").
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Core(#[from] falken_core::Error),

    #[error(transparent)]
    Store(#[from] falken_store::Error),

    #[error(transparent)]
    Monitor(#[from] falken_monitor::Error),

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same assignment from scratch is plausible, as
    /// opposed to a terminal misconfiguration. Used by `falken-cli`'s outer
    /// retry loop to decide whether to log-and-continue or exit non-zero
    /// immediately (spec.md §7: lease contention and IO are transient,
    /// `TypingError`/`HParamError`/`InvalidSpec` are not).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Store(falken_store::Error::VersionConflict { .. })
                | Error::Store(falken_store::Error::Io(_))
                | Error::Io(_)
        )
    }
}
