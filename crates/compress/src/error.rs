//! Compression Error Types

use derive_more::{Display, Error};

/// A compression error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for compression operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Failed to initialize a decoder for the requested format.
    Decoder,
    /// The requested format is not supported.
    #[display("unsupported format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// The requested format is supported but not enabled.
    #[display("disabled format: {_0}")]
    DisabledFormat(#[error(not(source))] String),
    /// An I/O operation on the underlying stream failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}
