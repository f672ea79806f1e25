//! Content-addressed resource storage over a pluggable filesystem
//! abstraction (spec.md §4.1), grounded in `data_store/resource_store.py`.

pub mod error;
pub mod filesystem;
pub mod records;
pub mod resource_store;

pub use error::{Error, Result};
pub use filesystem::{FileChangeEvent, FileSystem, LocalFileSystem, SharedFileSystem};
pub use records::Keyed;
pub use resource_store::{ListOptions, ResourceStore};
