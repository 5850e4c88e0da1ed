//! Compression Operations

use crate::Compression;
use crate::error::{ErrorKind, Result};
use bzip2::{Compression as BzCompression, read::BzDecoder, write::BzEncoder};
use exn::ResultExt;
use flate2::{Compression as GzCompression, write::GzEncoder};
use std::io::{Read, Write};
#[cfg(feature = "xz")]
use xz2::{read::XzDecoder, write::XzEncoder};
#[cfg(feature = "zstd")]
use zstd::stream::{read::Decoder as ZstdDecoder, write::Encoder as ZstdEncoder};

/// Boxed decompressing reader, safe to hand to a blocking thread.
pub type BoxRead<'a> = Box<dyn Read + Send + 'a>;

impl Compression {
    /// Wrap a reader with the appropriate decompression layer.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::{Cursor, Read};
    /// use strata_compress::Compression;
    ///
    /// let compressed = Compression::Gzip.compress(b"1\n2\n").unwrap();
    /// let mut reader = Compression::Gzip.wrap_reader(Cursor::new(compressed)).unwrap();
    /// let mut rows = String::new();
    /// reader.read_to_string(&mut rows).unwrap();
    /// assert_eq!(rows, "1\n2\n");
    /// ```
    pub fn wrap_reader<'a, R: Read + Send + 'a>(&self, reader: R) -> Result<BoxRead<'a>> {
        Ok(match self {
            Compression::None => Box::new(reader),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            // Multi-member gzip (concatenated `.gz` files) is common for
            // appended logs; a plain GzDecoder would stop after the first.
            Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
            #[cfg(feature = "xz")]
            Compression::Xz => Box::new(XzDecoder::new(reader)),
            #[cfg(feature = "zstd")]
            Compression::Zstd => Box::new(ZstdDecoder::new(reader).or_raise(|| ErrorKind::Decoder)?),
        })
    }

    /// Compress a byte slice in memory.
    ///
    /// Scans only ever read, so this exists for producing fixtures and for
    /// tooling that seeds a store.
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        match self {
            Compression::None => output.extend_from_slice(input),
            Compression::Bzip2 => {
                let mut encoder = BzEncoder::new(&mut output, BzCompression::default());
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(&mut output, GzCompression::default());
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
            #[cfg(feature = "xz")]
            Compression::Xz => {
                let mut encoder = XzEncoder::new(&mut output, 6);
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
            #[cfg(feature = "zstd")]
            Compression::Zstd => {
                let mut encoder = ZstdEncoder::new(&mut output, 0).or_raise(|| ErrorKind::Decoder)?;
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use crate::Compression;
    use rstest::rstest;
    use std::io::{Cursor, Read};

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Bzip2)]
    #[case(Compression::Gzip)]
    #[cfg_attr(feature = "xz", case(Compression::Xz))]
    #[cfg_attr(feature = "zstd", case(Compression::Zstd))]
    fn test_wrap_reader(#[case] format: Compression) {
        let original = b"id,name\n1,alpha\n2,beta\n";
        let compressed = format.compress(original).unwrap();
        let mut reader = format.wrap_reader(Cursor::new(compressed)).expect("decoder to initialize");
        let mut decompressed = Vec::new();
        reader.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[rstest]
    #[case(Compression::Bzip2)]
    #[case(Compression::Gzip)]
    #[cfg_attr(feature = "xz", case(Compression::Xz))]
    #[cfg_attr(feature = "zstd", case(Compression::Zstd))]
    fn test_invalid_compressed_data(#[case] format: Compression) {
        let mut out = Vec::new();
        let read = format
            .wrap_reader(Cursor::new(b"This is not compressed data"))
            .map(|mut reader| reader.read_to_end(&mut out));
        assert!(!matches!(read, Ok(Ok(_))));
    }

    #[test]
    fn test_concatenated_gzip_members() {
        let mut data = Compression::Gzip.compress(b"1\n").unwrap();
        data.extend(Compression::Gzip.compress(b"2\n").unwrap());
        let mut reader = Compression::Gzip.wrap_reader(Cursor::new(data)).unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "1\n2\n");
    }

    #[test]
    fn test_empty_input() {
        let compressed = Compression::Gzip.compress(b"").unwrap();
        let mut out = Vec::new();
        Compression::Gzip.wrap_reader(Cursor::new(compressed)).unwrap().read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
