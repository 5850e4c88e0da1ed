use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::Write;
use strata_scan::RowBatch;

/// How batches are rendered on stdout: one tab-separated line per row.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    pub count_only: bool,
    /// Prefix every row with the path of the object it came from.
    pub with_path: bool,
}

impl Output {
    pub fn write(&self, batch: &RowBatch) -> Result<()> {
        if self.count_only {
            return Ok(());
        }
        self.write_to(batch, &mut std::io::stdout().lock())
    }

    fn write_to(&self, batch: &RowBatch, out: &mut impl Write) -> Result<()> {
        let path = batch.source.path();
        for row in &batch.rows {
            if self.with_path {
                write!(out, "{path}\t").or_raise(|| ErrorKind::Output)?;
            }
            writeln!(out, "{}", row.join("\t")).or_raise(|| ErrorKind::Output)?;
        }
        Ok(())
    }
}
