//! Shared test fixtures for the Falken training coordination core: an
//! in-memory [`FileSystem`](falken_store::FileSystem), a deterministic
//! [`brain::FakeBrain`], and builders for the record types. Depended on by
//! every crate's `#[cfg(test)]` modules and the top-level integration
//! tests, never by production code.

pub mod brain;
pub mod builders;
pub mod fs;

pub use brain::{FakeBrain, FakeBrainFactory};
pub use fs::InMemoryFileSystem;
