//! CLI Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not load configuration")]
    Config,
    /// The configured store could not be constructed
    #[display("could not open store: {_0}")]
    Store(#[error(not(source))] String),
    #[display("could not open cache: {_0}")]
    Cache(#[error(not(source))] String),
    #[display("could not set up scan")]
    Setup,
    /// A processor failed while reading
    #[display("scan failed in {_0}")]
    Scan(#[error(not(source))] String),
    #[display("processor task did not complete")]
    Worker,
    #[display("could not write output")]
    Output,
}
