//! Error taxonomy for assignment leasing (spec.md §7).

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] falken_store::Error),
}
