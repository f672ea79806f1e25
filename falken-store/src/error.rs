//! Error taxonomy for the resource store (spec.md §7).

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("resource not found: {0}")]
    NotFound(String),

    /// More than one `resource.*` file exists for a resource id, or a
    /// filename failed to parse as a timestamp (spec.md §4.1 "Exactly one
    /// `resource.*` file per resource id is permitted").
    #[error("store corruption: {0}")]
    Corrupt(String),

    /// A caller-provided timestamp disagreed with one already on disk
    /// (spec.md §4.1 `Write`).
    #[error("version conflict for {resource_id}: existing timestamp {existing}, new {attempted}")]
    VersionConflict {
        resource_id: String,
        existing: i64,
        attempted: i64,
    },

    #[error("malformed pagination token: {0}")]
    InvalidPageToken(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] postcard::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] falken_core::Error),
}
