use crate::Compression;
use crate::error::{Error, ErrorKind};
use std::{path::Path, str::FromStr};

const BZIP2_MAGIC: [u8; 3] = [0x42, 0x5A, 0x68];
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
#[cfg(feature = "xz")]
const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
#[cfg(feature = "zstd")]
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Longest magic byte sequence of any supported format.
pub(crate) const MAGIC_LEN: usize = 6;

impl FromStr for Compression {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "bz2" | "bzip2" => Ok(Compression::Bzip2),
            "gz" | "gzip" => Ok(Compression::Gzip),
            #[cfg(feature = "xz")]
            "xz" | "lzma" => Ok(Compression::Xz),
            #[cfg(not(feature = "xz"))]
            "xz" | "lzma" => exn::bail!(ErrorKind::DisabledFormat(s.to_string())),
            #[cfg(feature = "zstd")]
            "zst" | "zstd" => Ok(Compression::Zstd),
            #[cfg(not(feature = "zstd"))]
            "zst" | "zstd" => exn::bail!(ErrorKind::DisabledFormat(s.to_string())),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(s.to_string())),
        }
    }
}
impl From<&[u8]> for Compression {
    fn from(value: &[u8]) -> Self {
        Compression::from_magic_bytes(value)
    }
}
impl Compression {
    /// Detect compression from an object key's extension.
    ///
    /// Works on any `/`-separated key, including `archive.zip::inner.csv.gz`
    /// style paths, since only the final extension is considered.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| match ext.to_lowercase().as_str() {
                "bz2" => Compression::Bzip2,
                "gz" | "gzip" => Compression::Gzip,
                #[cfg(feature = "xz")]
                "xz" => Compression::Xz,
                #[cfg(feature = "zstd")]
                "zst" | "zstd" => Compression::Zstd,
                _ => Compression::None,
            })
            .unwrap_or(Compression::None)
    }

    /// Detect compression format from magic bytes.
    ///
    /// Returns the `None` variant if no magic bytes match or if the input is
    /// too short to detect any format.
    #[must_use]
    pub fn from_magic_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(&BZIP2_MAGIC) {
            return Compression::Bzip2;
        }
        if bytes.starts_with(&GZIP_MAGIC) {
            return Compression::Gzip;
        }
        #[cfg(feature = "xz")]
        if bytes.starts_with(&XZ_MAGIC) {
            return Compression::Xz;
        }
        #[cfg(feature = "zstd")]
        if bytes.starts_with(&ZSTD_MAGIC) {
            return Compression::Zstd;
        }
        Compression::None
    }
}
