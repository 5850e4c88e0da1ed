//! Scan Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Errors raised by the store, cache or decompression
//! layers are kept as children of these kinds.

use derive_more::{Display, Error};

/// A scan error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A glob scan matched nothing and empty results were not acceptable
    #[display("no objects match {_0}")]
    NoMatches(#[error(not(source))] String),
    #[display("invalid glob pattern: {_0}")]
    InvalidGlob(#[error(not(source))] String),
    /// The scan was set up inconsistently (missing collaborator, no paths)
    #[display("invalid scan configuration: {_0}")]
    Configuration(#[error(not(source))] String),
    #[display("object not found: {_0}")]
    ObjectNotFound(#[error(not(source))] String),
    #[display("could not list objects under {_0}")]
    Listing(#[error(not(source))] String),
    #[display("could not open {_0}")]
    Open(#[error(not(source))] String),
    #[display("could not decode {_0}")]
    Decode(#[error(not(source))] String),
    /// Rows could not be parsed in the requested format
    #[display("malformed input: {_0}")]
    Format(#[error(not(source))] String),
    #[display("could not read archive {_0}")]
    Archive(#[error(not(source))] String),
    #[display("archive {_0} does not contain {_1}")]
    PathNotInArchive(#[error(not(source))] String, #[error(not(source))] String),
    #[display("read task source failed")]
    ReadTask,
    /// Building the next reader in the background failed
    #[display("background reader failed")]
    Prefetch,
    /// A blocking or background task panicked or was cancelled
    #[display("background task failed")]
    Background,
    #[display("cache operation failed")]
    Cache,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Listing(_) | Self::Open(_))
    }

    /// Returns `true` if the scanned object vanished (or never existed).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ObjectNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Listing("data/".into()), true)]
    #[case(ErrorKind::Open("data/a.csv".into()), true)]
    #[case(ErrorKind::NoMatches("data/*.csv".into()), false)]
    #[case(ErrorKind::PathNotInArchive("a.tar".into(), "x.csv".into()), false)]
    #[case(ErrorKind::Prefetch, false)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn test_display_names_both_paths() {
        let kind = ErrorKind::PathNotInArchive("logs.tar".into(), "day1.csv".into());
        assert_eq!(kind.to_string(), "archive logs.tar does not contain day1.csv");
    }
}
