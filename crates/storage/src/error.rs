//! Storage Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Object does not exist
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (S3 connections, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Object content no longer matches the version it was listed with
    #[display("object changed since it was listed: {_0}")]
    Modified(#[error(not(source))] String),
    /// Key contains invalid characters or escapes the store root
    #[display("invalid key: {_0}")]
    InvalidKey(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::BackendError(_))
    }

    /// Returns `true` if the object vanished (or never existed).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::NotFound("a".into()), false)]
    #[case(ErrorKind::InvalidKey("../a".into()), false)]
    #[case(ErrorKind::Modified("a".into()), false)]
    #[case(ErrorKind::Network("reset".into()), true)]
    #[case(ErrorKind::Io(IoError::other("disk")), true)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }

    #[test]
    fn test_display_names_key() {
        assert_eq!(ErrorKind::NotFound("data/a.csv".into()).to_string(), "object not found: data/a.csv");
    }
}
