use crate::archive::{ArchiveFileInfo, ArchiveHandle, ArchiveOpener, ArchiveReader, BoxSyncRead};
use crate::error::{ErrorKind, Result};
use crate::object::ObjectInfo;
use exn::{OptionExt, ResultExt};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use strata_compress::CompressionHint;
use time::OffsetDateTime;

/// Upper bound on what a header's size field may pre-allocate; the field is
/// untrusted until the bytes have actually been read.
const MAX_PREALLOCATION: u64 = 1 << 20;

/// Opens tar archives, optionally compressed (`.tar.gz`, `.tar.zst`, ...).
///
/// The whole archive is indexed and its regular files buffered on open: tar
/// has no central directory, so random access would otherwise mean
/// re-reading the stream per file.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarOpener {
    compression: CompressionHint,
}

impl TarOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// How to pick the decompression for the archive stream. Defaults to the
    /// archive's extension.
    pub fn with_compression(mut self, compression: CompressionHint) -> Self {
        self.compression = compression;
        self
    }
}

impl ArchiveOpener for TarOpener {
    fn open(&self, archive: &ObjectInfo, stream: BoxSyncRead) -> Result<ArchiveHandle> {
        let path = archive.path();
        let (_, reader) = self.compression.wrap_reader(&path, stream).or_raise(|| ErrorKind::Decode(path.to_string()))?;
        let mut tar = tar::Archive::new(reader);
        let mut files = BTreeMap::new();
        for entry in tar.entries().or_raise(|| ErrorKind::Archive(path.to_string()))? {
            let mut entry = entry.or_raise(|| ErrorKind::Archive(path.to_string()))?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = {
                let name = entry.path().or_raise(|| ErrorKind::Archive(path.to_string()))?;
                let name = name.to_str().ok_or_raise(|| ErrorKind::Archive(path.to_string()))?;
                name.strip_prefix("./").unwrap_or(name).to_string()
            };
            let modified = entry
                .header()
                .mtime()
                .ok()
                .and_then(|mtime| OffsetDateTime::from_unix_timestamp(mtime as i64).ok());
            let mut data = Vec::with_capacity(entry.size().min(MAX_PREALLOCATION) as usize);
            entry.read_to_end(&mut data).or_raise(|| ErrorKind::Archive(format!("{path}::{name}")))?;
            files.insert(
                name,
                TarFile {
                    data: Arc::from(data),
                    modified,
                },
            );
        }
        tracing::debug!(archive = %path, files = files.len(), "indexed tar archive");
        Ok(Arc::new(TarArchive {
            archive: path.into_owned(),
            files,
        }))
    }
}

struct TarFile {
    data: Arc<[u8]>,
    modified: Option<OffsetDateTime>,
}
impl TarFile {
    fn info(&self) -> ArchiveFileInfo {
        ArchiveFileInfo {
            size: self.data.len() as u64,
            modified: self.modified,
        }
    }
}

struct TarArchive {
    archive: String,
    files: BTreeMap<String, TarFile>,
}

impl ArchiveReader for TarArchive {
    fn file_info(&self, path: &str) -> Option<ArchiveFileInfo> {
        self.files.get(path).map(TarFile::info)
    }

    fn files(&self, filter: &dyn Fn(&str) -> bool) -> Vec<(String, ArchiveFileInfo)> {
        self.files
            .iter()
            .filter(|(name, _)| filter(name))
            .map(|(name, file)| (name.clone(), file.info()))
            .collect()
    }

    fn read_file(&self, path: &str) -> Result<BoxSyncRead> {
        let file = self
            .files
            .get(path)
            .ok_or_raise(|| ErrorKind::PathNotInArchive(self.archive.clone(), path.to_string()))?;
        Ok(Box::new(Cursor::new(Arc::clone(&file.data))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_compress::Compression;

    fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        builder.append_data(&mut dir, "./nested/", std::io::empty()).unwrap();
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_mtime(1_700_000_000);
            builder.append_data(&mut header, name, contents.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn open(key: &str, bytes: Vec<u8>) -> ArchiveHandle {
        TarOpener::new().open(&ObjectInfo::stored(key, None), Box::new(Cursor::new(bytes))).unwrap()
    }

    #[test]
    fn test_index_and_read() {
        let archive = open("a.tar", tarball(&[("./nested/x.csv", "1\n2\n"), ("y.csv", "3\n")]));
        let files: Vec<_> = archive.files(&|_| true).into_iter().map(|(name, _)| name).collect();
        assert_eq!(files, ["nested/x.csv", "y.csv"]);
        let info = archive.file_info("nested/x.csv").unwrap();
        assert_eq!(info.size, 4);
        assert_eq!(info.modified.map(OffsetDateTime::unix_timestamp), Some(1_700_000_000));
        let mut contents = String::new();
        archive.read_file("y.csv").unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "3\n");
        assert!(archive.read_file("nested/").is_err());
    }

    #[test]
    fn test_filter() {
        let archive = open("a.tar", tarball(&[("a.csv", "1"), ("b.json", "2")]));
        let files = archive.files(&|name| name.ends_with(".csv"));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "a.csv");
    }

    #[test]
    fn test_compressed_by_extension() {
        let bytes = Compression::Gzip.compress(&tarball(&[("a.csv", "1\n")])).unwrap();
        let archive = open("a.tar.gz", bytes);
        assert!(archive.file_exists("a.csv"));
    }

    #[test]
    fn test_oversized_header_is_an_error() {
        let mut header = tar::Header::new_gnu();
        header.set_path("big.csv").unwrap();
        header.set_size(8 << 30);
        header.set_mode(0o644);
        header.set_cksum();
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(&[b'x'; 512]);
        let err = TarOpener::new()
            .open(&ObjectInfo::stored("a.tar", None), Box::new(Cursor::new(bytes)))
            .err()
            .unwrap();
        assert!(matches!(&*err, ErrorKind::Archive(_)));
    }

    #[test]
    fn test_garbage_is_an_error() {
        let result = TarOpener::new().open(
            &ObjectInfo::stored("a.tar", None),
            Box::new(Cursor::new(b"definitely not a tarball, but long enough to have a header?".repeat(20))),
        );
        assert!(result.is_err());
    }
}
