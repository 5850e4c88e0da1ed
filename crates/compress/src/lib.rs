//! Transparent decompression for object streams.
//!
//! Objects in a bucket are frequently stored compressed (`events.csv.gz`,
//! `dump.jsonl.zst`). This crate wraps the decompression libraries behind a
//! unified [`Compression`] enum, providing:
//!
//! - **Format detection** from object keys ([`Compression::from_path`]) or
//!   magic bytes ([`Compression::from_magic_bytes`])
//! - **Streaming** decompression via wrapped readers
//!   ([`Compression::wrap_reader`])
//! - **Configured selection** via [`CompressionHint`], which resolves `auto`
//!   by extension, `detect` by sniffing the stream, or a fixed format
//!
//! Bzip2 and Gzip are always available. XZ and Zstd are behind (default)
//! feature flags.

mod construct;
pub mod error;
mod hint;
mod ops;
mod peekable;
mod util;

pub use crate::hint::CompressionHint;
pub use crate::ops::BoxRead;
pub use crate::peekable::PeekableReader;

/// A supported compression format.
///
/// Variants gated behind feature flags (`xz`, `zstd`) are only available when
/// the corresponding feature is enabled. Defaults to [`None`](Self::None)
/// (uncompressed).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Bzip2 compression (.bz2)
    Bzip2,
    /// Gzip compression (.gz)
    Gzip,
    /// XZ/LZMA compression (.xz)
    #[cfg(feature = "xz")]
    Xz,
    /// Zstd compression (.zst)
    #[cfg(feature = "zstd")]
    Zstd,
}

#[cfg(test)]
mod tests {
    use crate::Compression;

    #[test]
    fn compression_default() {
        assert_eq!(Compression::default(), Compression::None);
    }
}
