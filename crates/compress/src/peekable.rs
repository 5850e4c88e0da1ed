//! Peek at the head of a stream without consuming it.

use crate::Compression;
use crate::construct::MAGIC_LEN;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{Chain, Cursor, Read};

/// A resumable [`Read`]er for peek-decide-stream workflows.
///
/// Read enough bytes to inspect (magic bytes, a header line), then continue
/// streaming the full content via [`into_reader`](Self::into_reader).
pub struct PeekableReader<R> {
    inner: R,
    buffer: Vec<u8>,
}

impl<R: Read> PeekableReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, buffer: Vec::new() }
    }

    /// Read up to `limit` bytes of the content.
    ///
    /// Successive calls do not accumulate: `peek(4)` then `peek(8)` buffers 8
    /// bytes in total, and a later `peek(2)` returns immediately.
    pub fn peek(&mut self, limit: usize) -> Result<&[u8]> {
        if self.buffer.len() >= limit {
            return Ok(&self.buffer[..limit]);
        }
        let needed = (limit - self.buffer.len()) as u64;
        (&mut self.inner).take(needed).read_to_end(&mut self.buffer).or_raise(|| ErrorKind::Io)?;
        Ok(&self.buffer[..self.buffer.len().min(limit)])
    }

    /// Data read into the internal buffer so far.
    pub fn head(&self) -> &[u8] {
        &self.buffer
    }

    /// Convert into a [`Read`]er that replays the buffered head, then
    /// streams the rest.
    pub fn into_reader(self) -> Chain<Cursor<Vec<u8>>, R> {
        Cursor::new(self.buffer).chain(self.inner)
    }
}

impl Compression {
    /// Sniff the compression of a raw stream from its magic bytes.
    ///
    /// Returns the detected format together with a reader that still yields
    /// the stream from its first byte.
    ///
    /// ```
    /// use std::io::{Cursor, Read};
    /// use strata_compress::Compression;
    ///
    /// let compressed = Compression::Bzip2.compress(b"hello").unwrap();
    /// let (format, raw) = Compression::sniff(Cursor::new(compressed)).unwrap();
    /// assert_eq!(format, Compression::Bzip2);
    /// let mut out = String::new();
    /// format.wrap_reader(raw).unwrap().read_to_string(&mut out).unwrap();
    /// assert_eq!(out, "hello");
    /// ```
    pub fn sniff<R: Read>(reader: R) -> Result<(Self, Chain<Cursor<Vec<u8>>, R>)> {
        let mut peekable = PeekableReader::new(reader);
        let format = Self::from_magic_bytes(peekable.peek(MAGIC_LEN)?);
        Ok((format, peekable.into_reader()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_multiple_peek_calls() {
        let mut peekable = PeekableReader::new(Cursor::new(b"Hello, world! and more".to_vec()));
        assert_eq!(peekable.peek(5).unwrap(), b"Hello");
        assert_eq!(peekable.peek(13).unwrap(), b"Hello, world!");
        assert_eq!(peekable.peek(2).unwrap(), b"He");
        assert_eq!(peekable.head(), b"Hello, world!");
        let mut rest = String::new();
        peekable.into_reader().read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "Hello, world! and more");
    }

    #[test]
    fn test_peek_larger_than_data() {
        let mut peekable = PeekableReader::new(Cursor::new(b"tiny".to_vec()));
        assert_eq!(peekable.peek(1000).unwrap(), b"tiny");
    }

    #[rstest]
    #[case(Compression::None)]
    #[case(Compression::Gzip)]
    #[case(Compression::Bzip2)]
    #[cfg_attr(feature = "xz", case(Compression::Xz))]
    #[cfg_attr(feature = "zstd", case(Compression::Zstd))]
    fn test_sniff(#[case] format: Compression) {
        let compressed = format.compress(b"x,y\n1,2\n").unwrap();
        let (detected, raw) = Compression::sniff(Cursor::new(compressed.clone())).unwrap();
        assert_eq!(detected, format);
        let mut replayed = Vec::new();
        let mut raw = raw;
        raw.read_to_end(&mut replayed).unwrap();
        assert_eq!(replayed, compressed);
    }

    #[test]
    fn test_sniff_empty() {
        let (detected, _) = Compression::sniff(Cursor::new(Vec::new())).unwrap();
        assert_eq!(detected, Compression::None);
    }
}
