//! strata: scan objects in a local directory or S3 bucket.
//!
//! Objects are selected by glob or explicit key, optionally read from inside
//! tar archives, decoded with a simple line or delimited format and printed
//! as tab-separated rows. Several processors share one listing.

mod error;
mod output;
mod setup;

use crate::error::{ErrorKind, Result};
use crate::output::Output;
use clap::{Parser, ValueEnum};
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use strata_compress::CompressionHint;
use strata_config::Settings;
use strata_scan::archive::TarOpener;
use strata_scan::{
    DelimitedFormat, FormatHandle, IteratorOptions, LinesFormat, ObjectStorageSource, ReaderContext, ScanTarget,
    create_file_iterator,
};
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    /// One `line` column per line
    Lines,
    /// Comma-separated with a header row
    Csv,
    /// Tab-separated with a header row
    Tsv,
}

impl FormatArg {
    fn handle(self) -> FormatHandle {
        match self {
            Self::Lines => Arc::new(LinesFormat),
            Self::Csv => Arc::new(DelimitedFormat::csv()),
            Self::Tsv => Arc::new(DelimitedFormat::tsv()),
        }
    }
}

/// Scan objects in a blob store.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file. Defaults to `strata.toml` in the user configuration directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = FormatArg::Lines)]
    format: FormatArg,

    /// Print only the total number of rows.
    #[arg(long)]
    count: bool,

    /// Number of processors reading concurrently.
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    workers: u16,

    /// File (or glob) to read inside every matched tar archive.
    #[arg(long)]
    path_in_archive: Option<String>,

    /// Treat `--path-in-archive` literally even if it contains wildcards.
    #[arg(long, requires = "path_in_archive")]
    ignore_archive_globs: bool,

    /// Override `scan.compression`: `auto`, `detect` or a format name.
    #[arg(long)]
    compression: Option<String>,

    /// Prefix every printed row with its object path.
    #[arg(long, conflicts_with = "count")]
    with_path: bool,

    /// Keys or glob patterns, relative to the store root.
    #[arg(required = true)]
    paths: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<()> {
    let mut settings = Settings::load(args.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(compression) = &args.compression {
        settings.scan.compression = compression.parse::<CompressionHint>().or_raise(|| ErrorKind::Config)?;
    }

    let store = setup::build_store(&settings.store)?;
    let cache = setup::build_cache(&settings.cache).await?;

    let mut target = ScanTarget::new(args.paths.clone());
    if let Some(inner) = &args.path_in_archive {
        target = target.with_path_in_archive(inner);
    }
    let options = IteratorOptions::default()
        .with_archive_opener(Arc::new(TarOpener::new()))
        .with_ignore_archive_globs(args.ignore_archive_globs);
    let iterator =
        create_file_iterator(&target, &settings.scan, Arc::clone(&store), options).or_raise(|| ErrorKind::Setup)?;

    let ctx = ReaderContext::new(store, args.format.handle(), settings.scan.clone())
        .with_cache(cache)
        .with_need_only_count(args.count);
    let ctx = Arc::new(ctx);
    let output = Output {
        count_only: args.count,
        with_path: args.with_path,
    };

    let mut workers = JoinSet::new();
    for processor in 0..usize::from(args.workers) {
        let name = format!("processor-{processor}");
        let source = ObjectStorageSource::new(name, processor, Arc::clone(&ctx), Arc::clone(&iterator));
        workers.spawn(drain(source, output));
    }
    let mut total_rows = 0;
    while let Some(joined) = workers.join_next().await {
        total_rows += joined.or_raise(|| ErrorKind::Worker)??;
    }
    tracing::info!(total_rows, "scan complete");

    if args.count {
        println!("{total_rows}");
    }
    Ok(())
}

/// Pull batches from one source until its share of the listing is exhausted.
async fn drain(mut source: ObjectStorageSource, output: Output) -> Result<u64> {
    let mut total_rows = 0;
    let result = loop {
        match source.generate().await {
            Ok(Some(batch)) => {
                total_rows += batch.num_rows;
                if let Err(err) = output.write(&batch) {
                    break Err(err);
                }
            },
            Ok(None) => break Ok(total_rows),
            Err(err) => break Err(err.raise(ErrorKind::Scan(source.name().to_string()))),
        }
    };
    source.on_finish();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rstest::rstest;

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["strata", "data/*.csv"]).unwrap();
        assert_eq!(args.format, FormatArg::Lines);
        assert_eq!(args.workers, 1);
        assert!(!args.count);
        assert_eq!(args.paths, ["data/*.csv"]);
    }

    #[rstest]
    #[case(&["strata"])]
    #[case(&["strata", "--workers", "0", "a.csv"])]
    #[case(&["strata", "--format", "parquet", "a.csv"])]
    #[case(&["strata", "--ignore-archive-globs", "a.tar"])]
    #[case(&["strata", "--count", "--with-path", "a.csv"])]
    fn test_rejected(#[case] argv: &[&str]) {
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_archive_scan() {
        let args = Args::try_parse_from([
            "strata",
            "-f",
            "csv",
            "-w",
            "4",
            "--path-in-archive",
            "year=*/part-*.csv",
            "dumps/*.tar.gz",
        ])
        .unwrap();
        assert_eq!(args.format, FormatArg::Csv);
        assert_eq!(args.workers, 4);
        assert_eq!(args.path_in_archive.as_deref(), Some("year=*/part-*.csv"));
    }

    #[tokio::test]
    async fn test_drain_counts_rows() {
        use strata_config::ScanSettings;
        use strata_storage::backend::LocalStore;

        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(temp_dir.path().join("a.txt"), "1\n2\n3\n").unwrap();
        std::fs::write(temp_dir.path().join("b.txt"), "4\n").unwrap();
        let store = Arc::new(LocalStore::new("local", temp_dir.path()).unwrap());
        let settings = ScanSettings::default();
        let target = ScanTarget::new(["*.txt"]);
        let iterator = create_file_iterator(&target, &settings, store.clone(), IteratorOptions::default()).unwrap();
        let ctx = Arc::new(ReaderContext::new(store, FormatArg::Lines.handle(), settings).with_need_only_count(true));
        let source = ObjectStorageSource::new("processor-0", 0, ctx, iterator);
        let output = Output {
            count_only: true,
            ..Output::default()
        };
        assert_eq!(drain(source, output).await.unwrap(), 4);
    }
}
