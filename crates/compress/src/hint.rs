//! Configured compression selection.

use crate::Compression;
use crate::error::{Error, Result};
use crate::ops::BoxRead;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::Read;
use std::str::FromStr;

/// How a scan decides which decompression to apply to an object.
///
/// Parsed from configuration: `auto` (by key extension), `detect` (by magic
/// bytes), or any format name accepted by [`Compression`]'s `FromStr`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionHint {
    #[default]
    Auto,
    Detect,
    Fixed(Compression),
}

impl FromStr for CompressionHint {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "detect" => Ok(Self::Detect),
            _ => Ok(Self::Fixed(s.parse()?)),
        }
    }
}

impl Display for CompressionHint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Detect => f.write_str("detect"),
            Self::Fixed(compression) => compression.fmt(f),
        }
    }
}

impl CompressionHint {
    /// Wrap the raw stream of the object at `key` in the decompression this
    /// hint selects. Returns the chosen format alongside the reader.
    pub fn wrap_reader<'a, R: Read + Send + 'a>(&self, key: &str, reader: R) -> Result<(Compression, BoxRead<'a>)> {
        match self {
            Self::Auto => {
                let format = Compression::from_path(key);
                Ok((format, format.wrap_reader(reader)?))
            },
            Self::Detect => {
                let (format, raw) = Compression::sniff(reader)?;
                tracing::trace!(key, %format, "sniffed compression");
                Ok((format, format.wrap_reader(raw)?))
            },
            Self::Fixed(format) => Ok((*format, format.wrap_reader(reader)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Cursor;

    #[rstest]
    #[case("auto", CompressionHint::Auto)]
    #[case("AUTO", CompressionHint::Auto)]
    #[case("detect", CompressionHint::Detect)]
    #[case("none", CompressionHint::Fixed(Compression::None))]
    #[case("gzip", CompressionHint::Fixed(Compression::Gzip))]
    fn test_parse(#[case] input: &str, #[case] expected: CompressionHint) {
        assert_eq!(input.parse::<CompressionHint>().unwrap(), expected);
    }

    #[test]
    fn test_parse_unknown() {
        assert!("lz4".parse::<CompressionHint>().is_err());
    }

    #[rstest]
    #[case(CompressionHint::Auto, "data/a.csv.gz", Compression::Gzip)]
    #[case(CompressionHint::Auto, "data/a.csv", Compression::None)]
    #[case(CompressionHint::Detect, "data/a.csv", Compression::Gzip)]
    #[case(CompressionHint::Fixed(Compression::Gzip), "data/a", Compression::Gzip)]
    fn test_wrap_reader(#[case] hint: CompressionHint, #[case] key: &str, #[case] expected: Compression) {
        let bytes = if expected == Compression::Gzip {
            Compression::Gzip.compress(b"1\n2\n").unwrap()
        } else {
            b"1\n2\n".to_vec()
        };
        let (format, mut reader) = hint.wrap_reader(key, Cursor::new(bytes)).unwrap();
        assert_eq!(format, expected);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "1\n2\n");
    }
}
