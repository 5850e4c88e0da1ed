//! Concurrent object-store scans.
//!
//! A scan of a table backed by a blob store has three moving parts:
//!
//! 1. **Enumeration**: some [`ObjectIterator`] decides which objects make up
//!    the table. Keys can come from a glob, an explicit list, entries inside
//!    archives, or tasks handed out by a coordinator. Every implementation is
//!    shared by all workers of one scan and hands each object out once.
//! 2. **Reading**: [`ObjectStorageSource`] turns objects into row batches,
//!    opening the next object in the background while the current one is
//!    being decoded.
//! 3. **Caching**: row counts and inferred schemas are remembered per object
//!    version (see [`strata_cache`]) so repeated scans can skip work.

pub mod archive;
pub mod error;
pub mod format;
mod glob;
pub mod iterator;
mod object;
mod partition;
mod reader;
mod source;

pub use crate::archive::{ArchiveFileInfo, ArchiveHandle, ArchiveOpener, ArchiveReader};
pub use crate::format::{DelimitedFormat, FormatContext, FormatHandle, InputFormat, LinesFormat, RowReader, Rows};
pub use crate::glob::{GlobMatcher, expand_braces, has_globs};
pub use crate::iterator::{
    Hooks, IteratorHandle, IteratorOptions, ObjectIterator, ReadTask, ReadTaskSource, ScanTarget,
    create_file_iterator,
};
pub use crate::object::{
    ArchiveMember, FileProgress, ObjectInfo, ObjectInfoPtr, ProgressCallback, ReadKeys, StoredObject,
};
pub use crate::partition::{ObjectPredicate, VirtualColumns};
pub use crate::reader::ReaderContext;
pub use crate::source::{ObjectStorageSource, RowBatch};
