//! Cache Error Types

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A stored value could not be converted back (or a value could not be
    /// stored). Names the offending field.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
