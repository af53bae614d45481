// sqldump-ingest: loads 3wifi/p3wifi MySQL dumps and RouterScan exports into
// SQLite. Bad records never stop a run; they go to per-table rejection logs
// and get a second, more forgiving pass at the end.

mod config;
mod error;
mod extract;
mod geo;
mod loader;
mod logger;
mod normalize;
mod parser;
mod pipeline;
mod progress;
mod recovery;
mod rejects;
mod scan;
mod schema;
mod store;
mod summary;
mod value;

use clap::{CommandFactory, Parser, Subcommand};
use config::{ArityPolicy, IndexTier, IngestConfig};
use pipeline::Ingestor;
use progress::ProgressManager;
use schema::Layout;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use store::Store;
use summary::RunReport;

// Command-line flags and subcommands.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Enable debug logging (disables progress bars).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load MySQL INSERT dumps (3wifi geo/base or p3wifi geo/nets).
    Dump(DumpArgs),
    /// Load RouterScan tab-separated exports into the p3wifi layout.
    Routerscan(ScanArgs),
}

#[derive(clap::Args, Debug)]
struct StoreArgs {
    /// Output SQLite database.
    #[arg(long, default_value = "wifi.db")]
    db: PathBuf,

    /// Secondary indexes built after loading.
    #[arg(long, value_enum, default_value_t = IndexTier::Full)]
    index: IndexTier,

    /// Rows per insert transaction.
    #[arg(long, default_value_t = 5_000)]
    batch: usize,

    /// Parser threads (0 = cores - 1).
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Encodings tried in order for each chunk.
    #[arg(long, value_delimiter = ',', default_value = "utf-8,windows-1251,windows-1252")]
    encodings: Vec<String>,

    /// Skip the second pass over rejected records.
    #[arg(long)]
    no_recovery: bool,

    /// Skip ANALYZE/VACUUM after loading.
    #[arg(long)]
    no_optimize: bool,

    /// Attempts for the optimize pass.
    #[arg(long, default_value_t = 5)]
    optimize_attempts: u32,

    /// Base wait between optimize attempts, in seconds.
    #[arg(long, default_value_t = 3)]
    optimize_backoff: u64,

    /// Directory for errors_<table>.jsonl files.
    #[arg(long, default_value = ".")]
    error_dir: PathBuf,

    /// Write the run report as JSON to this file.
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct DumpArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Dump family; picks the target tables.
    #[arg(long, value_enum, default_value_t = Layout::ThreeWifi)]
    layout: Layout,

    /// Target chunk size in MiB.
    #[arg(long, default_value_t = 10)]
    chunk_mb: usize,

    /// Tuples with the wrong field count: pad/truncate, or reject for recovery.
    #[arg(long, value_enum, default_value_t = ArityPolicy::Repair)]
    arity: ArityPolicy,

    /// Dump files (.sql).
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct ScanArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Drop records identical to one already loaded in this run.
    #[arg(long)]
    dedupe: bool,

    /// RouterScan export files (.txt).
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

impl StoreArgs {
    fn config(&self) -> IngestConfig {
        IngestConfig {
            db_path: self.db.clone(),
            index_tier: self.index,
            batch_size: self.batch,
            workers: self.workers,
            encodings: self.encodings.clone(),
            recover: !self.no_recovery,
            optimize: !self.no_optimize,
            optimize_attempts: self.optimize_attempts,
            optimize_backoff: Duration::from_secs(self.optimize_backoff),
            error_dir: self.error_dir.clone(),
            ..IngestConfig::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let wall_start = Instant::now();
    if std::env::args().len() == 1 {
        Args::command().print_help()?;
        eprintln!();
        std::process::exit(1);
    }
    let args = Args::parse();

    logger::init(args.debug);
    // Progress bars are disabled in debug mode to avoid mangled output.
    let progress = ProgressManager::new(!logger::is_debug());

    let (mut report, summary_json) = match args.command {
        Command::Dump(dump) => {
            let config = IngestConfig {
                layout: dump.layout,
                chunk_size: dump.chunk_mb.max(1) * 1024 * 1024,
                arity: dump.arity,
                ..dump.store.config()
            };
            config.validate()?;
            tracing::debug!(?config, files = dump.files.len(), "starting dump import");
            let mut store = Store::open(&config.db_path)?;
            let ingestor = Ingestor::new(&config, &progress)?;
            let report = ingestor.ingest_dumps(&mut store, &dump.files)?;
            (report, dump.store.summary_json)
        }
        Command::Routerscan(scan) => {
            let config = IngestConfig {
                layout: Layout::P3Wifi,
                ..scan.store.config()
            };
            config.validate()?;
            tracing::debug!(?config, files = scan.files.len(), "starting RouterScan import");
            let mut store = Store::open(&config.db_path)?;
            let ingestor = Ingestor::new(&config, &progress)?;
            let report = ingestor.ingest_scans(&mut store, &scan.files, scan.dedupe)?;
            (report, scan.store.summary_json)
        }
    };
    report.elapsed_ms = wall_start.elapsed().as_millis();

    if let Some(opt) = report.optimize.as_ref().filter(|o| !o.completed) {
        tracing::warn!(
            attempts = opt.attempts,
            "database left unoptimized: {}",
            opt.last_error.as_deref().unwrap_or("unknown error")
        );
    }

    if let Some(path) = summary_json {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)?;
    }

    print_summary(&report)?;
    tracing::debug!("import complete");
    Ok(())
}

fn print_summary(report: &RunReport) -> io::Result<()> {
    let sep = "=".repeat(60);
    let mut stderr = io::stderr();
    writeln!(stderr, "\n{}\nSUMMARY\n{}", sep, sep)?;
    writeln!(
        stderr,
        "Files:      {} ({} failed)",
        report.files.len(),
        report.failed_files()
    )?;
    for file in &report.files {
        if let Some(err) = &file.error {
            writeln!(stderr, "  {}: {}", progress::basename(&file.path), err)?;
        }
    }
    if let Some(scan) = &report.scan {
        writeln!(
            stderr,
            "Records:    {} (coords {}, keys {}, pins {}, admin {})",
            scan.records, scan.with_coordinates, scan.with_key, scan.with_pin, scan.with_admin
        )?;
        writeln!(stderr, "Duplicates: {}", report.duplicates_skipped)?;
    }
    writeln!(stderr, "{}", "-".repeat(60))?;
    for t in &report.tables {
        writeln!(stderr, "[{}]", t.table)?;
        writeln!(stderr, "  Loaded:     {} ({} repaired)", t.normal + t.fixed, t.fixed)?;
        writeln!(stderr, "  Duplicates: {}", t.ignored)?;
        writeln!(
            stderr,
            "  Rejected:   {} (recovered {}, salvaged {}, lost {})",
            t.failed, t.recovered, t.salvaged, t.permanently_failed
        )?;
        writeln!(stderr, "  Rows:       {}", t.rows_in_store)?;
    }
    writeln!(stderr, "{}", "-".repeat(60))?;
    writeln!(stderr, "Indexes:    {}", report.indexes_created)?;
    match &report.optimize {
        Some(o) if o.completed => writeln!(stderr, "Optimize:   done ({} attempt(s))", o.attempts)?,
        Some(o) => writeln!(stderr, "Optimize:   gave up after {} attempt(s)", o.attempts)?,
        None => writeln!(stderr, "Optimize:   skipped")?,
    }
    writeln!(
        stderr,
        "Elapsed:    {:.1}s",
        report.elapsed_ms as f64 / 1000.0
    )?;
    writeln!(stderr, "{}", sep)?;
    Ok(())
}
