//! Row formats.
//!
//! Decoding is pluggable: an [`InputFormat`] turns a decompressed byte
//! stream into a [`RowReader`] that yields batches of rows. Two simple
//! formats are built in, enough to scan logs and plain delimited exports.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use strata_cache::{ColumnDef, Schema};
use strata_compress::BoxRead;

/// A batch of rows, each row a list of column values.
pub type Rows = Vec<Vec<String>>;

/// What a format is told about the stream it decodes.
#[derive(Debug, Clone)]
pub struct FormatContext {
    /// Schema learned from an earlier scan of the same object. Formats that
    /// infer columns may use it instead of inferring again.
    pub schema_hint: Option<Schema>,
    /// Maximum rows per batch.
    pub max_block_size: usize,
}

impl Default for FormatContext {
    fn default() -> Self {
        Self {
            schema_hint: None,
            max_block_size: 8192,
        }
    }
}

/// Pulls row batches out of one object. Calls may block on I/O.
pub trait RowReader: Send {
    /// The next batch, or `None` at end of input.
    fn next_batch(&mut self) -> Result<Option<Rows>>;

    /// Columns of the rows read so far, if known yet.
    fn schema(&self) -> Option<Schema>;
}

pub trait InputFormat: Send + Sync {
    /// Part of every cache key: two formats may disagree on what a row is.
    fn name(&self) -> &str;

    fn reader(&self, stream: BoxRead<'static>, ctx: &FormatContext) -> Result<Box<dyn RowReader>>;

    /// Count rows without materializing them.
    fn count_rows(&self, stream: BoxRead<'static>, ctx: &FormatContext) -> Result<u64> {
        let mut reader = self.reader(stream, ctx)?;
        let mut total = 0;
        while let Some(rows) = reader.next_batch()? {
            total += rows.len() as u64;
        }
        Ok(total)
    }
}

pub type FormatHandle = Arc<dyn InputFormat>;

struct LineSource {
    inner: BufReader<BoxRead<'static>>,
    buf: Vec<u8>,
    line: u64,
}

impl LineSource {
    fn new(stream: BoxRead<'static>) -> Self {
        Self {
            inner: BufReader::new(stream),
            buf: Vec::new(),
            line: 0,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let read = self
            .inner
            .read_until(b'\n', &mut self.buf)
            .or_raise(|| ErrorKind::Format(format!("read failed after line {}", self.line)))?;
        if read == 0 {
            return Ok(None);
        }
        self.line += 1;
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        let line = String::from_utf8(std::mem::take(&mut self.buf))
            .or_raise(|| ErrorKind::Format(format!("line {} is not valid UTF-8", self.line)))?;
        Ok(Some(line))
    }
}

/// Every line is a row with a single `line` column.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinesFormat;

struct LinesReader {
    source: LineSource,
    max_block_size: usize,
}

impl RowReader for LinesReader {
    fn next_batch(&mut self) -> Result<Option<Rows>> {
        let mut rows = Vec::new();
        while rows.len() < self.max_block_size {
            match self.source.next_line()? {
                Some(line) => rows.push(vec![line]),
                None => break,
            }
        }
        Ok((!rows.is_empty()).then_some(rows))
    }

    fn schema(&self) -> Option<Schema> {
        Some(lines_schema())
    }
}

fn lines_schema() -> Schema {
    Schema::new([ColumnDef::new("line", "String")])
}

impl InputFormat for LinesFormat {
    fn name(&self) -> &str {
        "lines"
    }

    fn reader(&self, stream: BoxRead<'static>, ctx: &FormatContext) -> Result<Box<dyn RowReader>> {
        Ok(Box::new(LinesReader {
            source: LineSource::new(stream),
            max_block_size: ctx.max_block_size.max(1),
        }))
    }

    fn count_rows(&self, stream: BoxRead<'static>, _ctx: &FormatContext) -> Result<u64> {
        let mut reader = BufReader::new(stream);
        let mut count = 0;
        let mut last = None;
        loop {
            let chunk = reader.fill_buf().or_raise(|| ErrorKind::Format(format!("read failed after {count} lines")))?;
            if chunk.is_empty() {
                break;
            }
            count += chunk.iter().filter(|byte| **byte == b'\n').count() as u64;
            last = chunk.last().copied();
            let consumed = chunk.len();
            reader.consume(consumed);
        }
        // A final line without a trailing newline still counts.
        if last.is_some_and(|byte| byte != b'\n') {
            count += 1;
        }
        Ok(count)
    }
}

/// Delimiter-separated values, quoted the usual CSV way. With a header, the
/// first record names the columns; otherwise they are named `c1`, `c2`, ...
///
/// Column types are inferred from the first data row (`Int64`, `Float64`,
/// else `String`) unless a schema hint is given.
#[derive(Debug, Clone)]
pub struct DelimitedFormat {
    name: String,
    delimiter: u8,
    has_header: bool,
}

impl DelimitedFormat {
    pub fn new(name: impl Into<String>, delimiter: u8, has_header: bool) -> Self {
        Self {
            name: name.into(),
            delimiter,
            has_header,
        }
    }

    pub fn csv() -> Self {
        Self::new("csv", b',', true)
    }

    pub fn tsv() -> Self {
        Self::new("tsv", b'\t', true)
    }

    fn csv_reader(&self, stream: BoxRead<'static>) -> csv::Reader<BoxRead<'static>> {
        // Width is checked per record so the error can name the line.
        csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_header)
            .flexible(true)
            .from_reader(stream)
    }
}

struct DelimitedReader {
    inner: csv::Reader<BoxRead<'static>>,
    record: csv::StringRecord,
    max_block_size: usize,
    names: Option<Vec<String>>,
    schema: Option<Schema>,
}

fn infer_type(value: &str) -> &'static str {
    if value.parse::<i64>().is_ok() {
        "Int64"
    } else if value.parse::<f64>().is_ok() {
        "Float64"
    } else {
        "String"
    }
}

fn record_line(record: &csv::StringRecord) -> u64 {
    record.position().map(csv::Position::line).unwrap_or_default()
}

impl DelimitedReader {
    fn check_width(&mut self, row: &[String], line: u64) -> Result<()> {
        let expected = match (&self.schema, &self.names) {
            (Some(schema), _) => schema.len(),
            (None, Some(names)) => names.len(),
            (None, None) => {
                let names = (1..=row.len()).map(|i| format!("c{i}")).collect();
                self.names = Some(names);
                row.len()
            },
        };
        if self.schema.is_none() {
            let names = self.names.iter().flatten();
            let columns = names.zip(row).map(|(name, value)| ColumnDef::new(name, infer_type(value)));
            self.schema = Some(Schema::new(columns));
        }
        if row.len() != expected {
            exn::bail!(ErrorKind::Format(format!("line {line} has {} fields, expected {expected}", row.len())));
        }
        Ok(())
    }
}

impl RowReader for DelimitedReader {
    fn next_batch(&mut self) -> Result<Option<Rows>> {
        let mut rows = Vec::new();
        while rows.len() < self.max_block_size {
            let more = self
                .inner
                .read_record(&mut self.record)
                .or_raise(|| ErrorKind::Format(format!("malformed record after line {}", record_line(&self.record))))?;
            if !more {
                break;
            }
            let row: Vec<String> = self.record.iter().map(str::to_string).collect();
            let line = record_line(&self.record);
            self.check_width(&row, line)?;
            rows.push(row);
        }
        if rows.is_empty() && self.schema.is_none() {
            // Header only: the columns are known, their types are not.
            let columns = self.names.iter().flatten().map(|name| ColumnDef::new(name, "String"));
            self.schema = self.names.is_some().then(|| Schema::new(columns));
        }
        Ok((!rows.is_empty()).then_some(rows))
    }

    fn schema(&self) -> Option<Schema> {
        self.schema.clone()
    }
}

impl InputFormat for DelimitedFormat {
    fn name(&self) -> &str {
        &self.name
    }

    fn reader(&self, stream: BoxRead<'static>, ctx: &FormatContext) -> Result<Box<dyn RowReader>> {
        let mut inner = self.csv_reader(stream);
        let mut names = None;
        if self.has_header {
            let header = inner.headers().or_raise(|| ErrorKind::Format("malformed header".to_string()))?;
            // An empty stream has no header at all.
            if !header.is_empty() {
                names = Some(header.iter().map(str::to_string).collect());
            }
        }
        Ok(Box::new(DelimitedReader {
            inner,
            record: csv::StringRecord::new(),
            max_block_size: ctx.max_block_size.max(1),
            names,
            schema: ctx.schema_hint.clone(),
        }))
    }

    /// Counts records, not lines: a quoted field may span several lines.
    fn count_rows(&self, stream: BoxRead<'static>, _ctx: &FormatContext) -> Result<u64> {
        let mut inner = self.csv_reader(stream);
        let mut record = csv::ByteRecord::new();
        let mut count = 0;
        while inner
            .read_byte_record(&mut record)
            .or_raise(|| ErrorKind::Format(format!("malformed record after {count} rows")))?
        {
            count += 1;
        }
        Ok(count)
    }
}
