use crate::Compression;
use std::fmt::{Display, Formatter, Result as FmtResult};

impl Display for Compression {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

impl Compression {
    /// Returns the file extension for this compression format.
    #[inline]
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Bzip2 => ".bz2",
            Compression::Gzip => ".gz",
            #[cfg(feature = "xz")]
            Compression::Xz => ".xz",
            #[cfg(feature = "zstd")]
            Compression::Zstd => ".zst",
        }
    }

    /// Returns the short name used in configuration.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Bzip2 => "bzip2",
            Compression::Gzip => "gzip",
            #[cfg(feature = "xz")]
            Compression::Xz => "xz",
            #[cfg(feature = "zstd")]
            Compression::Zstd => "zstd",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;

    #[rstest]
    #[case(Compression::None, "")]
    #[case(Compression::Bzip2, ".bz2")]
    #[case(Compression::Gzip, ".gz")]
    #[cfg_attr(feature = "xz", case(Compression::Xz, ".xz"))]
    #[cfg_attr(feature = "zstd", case(Compression::Zstd, ".zst"))]
    fn test_extension(#[case] format: Compression, #[case] expected: &str) {
        assert_eq!(format.extension(), expected);
        assert_eq!(format.as_str().parse::<Compression>().unwrap(), format);
    }
}
