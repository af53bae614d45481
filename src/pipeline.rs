// Ingestion pipeline: producer -> parser workers -> single loader.
//
// One file at a time, a producer thread cuts the file into chunks and feeds a
// bounded task queue; rayon workers decode and parse chunks and send their
// outcome over a bounded result queue; the calling thread owns the store
// connection and loads outcomes in arrival order. After the last file each
// table's rejection log is replayed through recovery, then indexes are built
// and the database is optimized.

use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::extract::{ChunkOutcome, Extractor};
use crate::loader::TableLoader;
use crate::parser::chunk::{ChunkDecoder, ChunkReader, RawChunk};
use crate::parser::routerscan::ScanStats;
use crate::progress::ProgressManager;
use crate::recovery::recover_table;
use crate::rejects::{read_rejections, RejectionLog};
use crate::scan::{self, ScanRows};
use crate::schema::{Layout, TableSpec};
use crate::store::{OptimizeOutcome, RetryPolicy, Store};
use crate::summary::{FileReport, OptimizeReport, RunReport, TableSummary};
use ahash::AHashSet;
use crossbeam_channel::{bounded, Receiver};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

// Slots of the p3wifi layout used by scan imports.
const SCAN_GEO: usize = 0;
const SCAN_NETS: usize = 1;

struct ScanOutcome {
    path: PathBuf,
    result: Result<ScanRows>,
}

pub struct Ingestor<'a> {
    config: &'a IngestConfig,
    progress: &'a ProgressManager,
    pool: rayon::ThreadPool,
}

impl<'a> Ingestor<'a> {
    pub fn new(config: &'a IngestConfig, progress: &'a ProgressManager) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_count())
            .thread_name(|i| format!("parse-{}", i))
            .build()
            .map_err(|e| IngestError::Worker(e.to_string()))?;
        Ok(Self {
            config,
            progress,
            pool,
        })
    }

    // Load SQL dump files into the configured layout. A file that cannot be
    // decoded is reported and skipped; the run carries on with the next one.
    pub fn ingest_dumps(&self, store: &mut Store, files: &[PathBuf]) -> Result<RunReport> {
        let started = Instant::now();
        let tables = self.config.layout.tables();
        store.create_tables(tables)?;
        let mut loaders = self.open_loaders(tables)?;
        let mut report = RunReport::default();

        for path in files {
            tracing::debug!(file = %path.display(), "loading dump");
            let file = match self.load_dump_file(store, &mut loaders, path) {
                Ok(file) => file,
                Err(e) => {
                    tracing::debug!(file = %path.display(), "file aborted: {}", e);
                    FileReport {
                        error: Some(e.to_string()),
                        ..FileReport::new(path.clone())
                    }
                }
            };
            report.files.push(file);
        }

        report.tables = self.close_tables(store, loaders)?;
        self.finish_store(store, tables, &mut report)?;
        report.elapsed_ms = started.elapsed().as_millis();
        Ok(report)
    }

    // Load RouterScan exports into the p3wifi layout, one worker task per file.
    pub fn ingest_scans(
        &self,
        store: &mut Store,
        files: &[PathBuf],
        dedupe: bool,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let tables = Layout::P3Wifi.tables();
        store.create_tables(tables)?;
        let mut loaders = self.open_loaders(tables)?;
        let decoder = ChunkDecoder::from_labels(&self.config.encodings)?;
        let timestamp = scan::timestamp_now();
        let bar = self
            .progress
            .new_count_bar(files.len() as u64, "Scan files");
        let mut report = RunReport::default();
        let (result_tx, result_rx) = bounded::<ScanOutcome>(self.config.worker_count() * 2);

        let loaded = thread::scope(|scope| {
            let (decoder, timestamp, pool) = (&decoder, timestamp.as_str(), &self.pool);
            scope.spawn(move || {
                pool.install(|| {
                    files.par_iter().for_each_with(result_tx, |tx, path| {
                        let result = scan::scan_file(path, decoder, timestamp);
                        // The loader only hangs up after an error of its own.
                        let _ = tx.send(ScanOutcome {
                            path: path.clone(),
                            result,
                        });
                    });
                });
            });
            self.consume_scans(result_rx, store, &mut loaders, dedupe, &mut report, bar.as_ref())
        });
        if let Some(b) = bar {
            b.finish();
        }
        loaded?;

        report.tables = self.close_tables(store, loaders)?;
        self.finish_store(store, tables, &mut report)?;
        report.elapsed_ms = started.elapsed().as_millis();
        Ok(report)
    }

    fn open_loaders(&self, tables: &[&'static TableSpec]) -> Result<Vec<TableLoader>> {
        tables
            .iter()
            .map(|spec| {
                let log = RejectionLog::create(&self.config.rejection_log_path(spec.name))?;
                Ok(TableLoader::new(*spec, self.config.batch_size, log))
            })
            .collect()
    }

    fn load_dump_file(
        &self,
        store: &mut Store,
        loaders: &mut [TableLoader],
        path: &Path,
    ) -> Result<FileReport> {
        let started = Instant::now();
        let reader = ChunkReader::open(path, self.config.chunk_size)?;
        let decoder = ChunkDecoder::from_labels(&self.config.encodings)?;
        let extractor = Extractor::new(self.config.layout.tables(), self.config.arity);
        let workers = self.config.worker_count();
        let bar = self.progress.new_file_bar(path, reader.len());
        let mut report = FileReport::new(path.to_path_buf());

        let (task_tx, task_rx) = bounded::<RawChunk<'_>>(workers * 2);
        let (result_tx, result_rx) = bounded::<Result<ChunkOutcome>>(workers * 2);

        let loaded = thread::scope(|scope| {
            let (reader, decoder, extractor, pool) = (&reader, &decoder, &extractor, &self.pool);

            scope.spawn(move || {
                for chunk in reader.chunks() {
                    if task_tx.send(chunk).is_err() {
                        break;
                    }
                }
            });

            scope.spawn(move || {
                pool.scope(|s| {
                    for _ in 0..workers {
                        let task_rx = task_rx.clone();
                        let result_tx = result_tx.clone();
                        s.spawn(move |_| {
                            for chunk in task_rx.iter() {
                                let outcome = decoder.decode(&chunk).map(|text| {
                                    extractor.extract(&text, chunk.index, chunk.bytes.len() as u64)
                                });
                                if result_tx.send(outcome).is_err() {
                                    break;
                                }
                            }
                        });
                    }
                });
            });

            self.consume_chunks(result_rx, store, loaders, &mut report, bar.as_ref())
        });

        if let Some(b) = bar {
            b.finish();
        }
        report.elapsed_ms = started.elapsed().as_millis();
        loaded.map(|()| report)
    }

    // Takes the receiver by value: returning early hangs up on the workers,
    // which then stop and let the scope join.
    fn consume_chunks(
        &self,
        results: Receiver<Result<ChunkOutcome>>,
        store: &mut Store,
        loaders: &mut [TableLoader],
        report: &mut FileReport,
        bar: Option<&ProgressBar>,
    ) -> Result<()> {
        for outcome in results.iter() {
            let outcome = outcome?;
            report.chunks += 1;
            report.bytes += outcome.bytes;
            report.statements += outcome.statements;
            report.skipped_statements += outcome.skipped_statements;
            if let Some(b) = bar {
                b.inc(outcome.bytes);
            }
            for (loader, part) in loaders.iter_mut().zip(outcome.tables) {
                for record in part.rejects {
                    loader.reject(record)?;
                }
                for row in part.rows {
                    loader.push(store.conn_mut(), row)?;
                }
            }
        }
        Ok(())
    }

    fn consume_scans(
        &self,
        results: Receiver<ScanOutcome>,
        store: &mut Store,
        loaders: &mut [TableLoader],
        dedupe: bool,
        report: &mut RunReport,
        bar: Option<&ProgressBar>,
    ) -> Result<()> {
        let mut seen: AHashSet<[u8; 32]> = AHashSet::new();
        let mut totals = ScanStats::default();
        for outcome in results.iter() {
            let mut file = FileReport::new(outcome.path);
            match outcome.result {
                Ok(scanned) => {
                    file.bytes = scanned.bytes;
                    file.records = scanned.stats.records;
                    file.skipped_lines = scanned.stats.lines - scanned.stats.records;
                    totals.merge(&scanned.stats);
                    for row in scanned.rows {
                        if dedupe && !seen.insert(row.digest) {
                            report.duplicates_skipped += 1;
                            continue;
                        }
                        if let Some(geo) = row.geo {
                            loaders[SCAN_GEO].push(store.conn_mut(), geo)?;
                        }
                        loaders[SCAN_NETS].push(store.conn_mut(), row.nets)?;
                    }
                }
                Err(e) => {
                    tracing::debug!(file = %file.path.display(), "scan file skipped: {}", e);
                    file.error = Some(e.to_string());
                }
            }
            report.files.push(file);
            if let Some(b) = bar {
                b.inc(1);
            }
        }
        report.scan = Some(totals);
        Ok(())
    }

    // Flush every table, replay its rejection log through recovery and close
    // the log with a summary line.
    fn close_tables(&self, store: &mut Store, loaders: Vec<TableLoader>) -> Result<Vec<TableSummary>> {
        let mut summaries = Vec::with_capacity(loaders.len());
        for loader in loaders {
            let spec = loader.spec();
            let (counters, log) = loader.finish(store.conn_mut())?;
            drop(log);
            let path = self.config.rejection_log_path(spec.name);

            let recovery = if self.config.recover && counters.failed > 0 {
                let records = read_rejections(&path)?;
                let bar = self
                    .progress
                    .new_count_bar(records.len() as u64, &format!("Recover {}", spec.name));
                let mut log = RejectionLog::append(&path)?;
                let report = recover_table(store.conn_mut(), spec, &records, &mut log, bar.as_ref())?;
                if let Some(b) = bar {
                    b.finish();
                }
                Some(report)
            } else {
                None
            };

            let summary = TableSummary::new(spec.name, counters, recovery, store.count_rows(spec.name)?);
            let mut log = RejectionLog::append(&path)?;
            log.summary(&summary)?;
            log.flush()?;
            summaries.push(summary);
        }
        Ok(summaries)
    }

    fn finish_store(&self, store: &Store, tables: &[&TableSpec], report: &mut RunReport) -> Result<()> {
        let index_start = Instant::now();
        report.indexes_created = store.create_indexes(tables, self.config.index_tier)?;
        tracing::debug!("indexes built in {:?}", index_start.elapsed());

        if self.config.optimize {
            let policy = RetryPolicy {
                attempts: self.config.optimize_attempts,
                base_delay: self.config.optimize_backoff,
            };
            report.optimize = Some(match store.optimize(policy) {
                OptimizeOutcome::Done { attempts } => OptimizeReport {
                    attempts,
                    completed: true,
                    last_error: None,
                },
                OptimizeOutcome::GaveUp {
                    attempts,
                    last_error,
                } => OptimizeReport {
                    attempts,
                    completed: false,
                    last_error: Some(last_error),
                },
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArityPolicy, IndexTier};
    use crate::rejects::{read_entries, LogEntry};
    use std::io::Write;

    fn config(dir: &Path) -> IngestConfig {
        IngestConfig {
            db_path: dir.join("wifi.db"),
            workers: 2,
            chunk_size: 64,
            batch_size: 3,
            optimize: false,
            error_dir: dir.to_path_buf(),
            ..IngestConfig::default()
        }
    }

    fn write(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body).unwrap();
        path
    }

    fn base_tuple(id: u32) -> String {
        format!(
            "({},'2015-01-01 00:00:00',0,0,80,NULL,NULL,0,0,0,{},'net{}',2,'key{}',12345670,0,0,0,0,0,0,0,0)",
            id,
            100000000 + id,
            id,
            id
        )
    }

    #[test]
    fn dump_load_counts_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let progress = ProgressManager::new(false);
        let ingestor = Ingestor::new(&cfg, &progress).unwrap();

        let mut body = String::from("/*!40101 SET NAMES utf8 */;\n-- dump\n");
        for chunk in 0..10 {
            let tuples: Vec<String> = (1..=5).map(|i| base_tuple(chunk * 5 + i)).collect();
            body.push_str(&format!("INSERT INTO `base` VALUES {};\n", tuples.join(",")));
        }
        body.push_str("INSERT INTO `geo` VALUES (1,55.75,37.61,NULL),(2,0,0,0);\n");
        // One headless fragment and one duplicate.
        body.push_str(&format!("INSERT INTO `base` VALUES 'frag', 2, 'k', 1),{};\n", base_tuple(1)));
        let dump = write(dir.path(), "dump.sql", body.as_bytes());

        let mut store = Store::open(&cfg.db_path).unwrap();
        let report = ingestor.ingest_dumps(&mut store, &[dump]).unwrap();

        assert_eq!(report.failed_files(), 0);
        let base = report.tables.iter().find(|t| t.table == "base").unwrap();
        assert_eq!(base.normal, 50);
        assert_eq!(base.ignored, 1);
        assert_eq!(base.failed, 1);
        assert_eq!(base.recovered + base.salvaged, 1);
        assert_eq!(base.rows_in_store, 51);
        let geo = report.tables.iter().find(|t| t.table == "geo").unwrap();
        assert_eq!(geo.rows_in_store, 2);
        assert_eq!(report.indexes_created, 8);

        let entries = read_entries(&cfg.rejection_log_path("base")).unwrap();
        assert!(matches!(entries.last(), Some(LogEntry::Summary(s)) if s.normal == 50));
    }

    #[test]
    fn rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = IngestConfig {
            index_tier: IndexTier::None,
            ..config(dir.path())
        };
        let progress = ProgressManager::new(false);
        let ingestor = Ingestor::new(&cfg, &progress).unwrap();
        let tuples: Vec<String> = (1..=20).map(base_tuple).collect();
        let dump = write(
            dir.path(),
            "dump.sql",
            format!("INSERT INTO base VALUES {};\n", tuples.join(",\n")).as_bytes(),
        );

        let mut store = Store::open(&cfg.db_path).unwrap();
        ingestor.ingest_dumps(&mut store, &[dump.clone()]).unwrap();
        let second = ingestor.ingest_dumps(&mut store, &[dump]).unwrap();
        let base = second.tables.iter().find(|t| t.table == "base").unwrap();
        assert_eq!(base.ignored, 20);
        assert_eq!(base.rows_in_store, 20);
    }

    #[test]
    fn undecodable_file_is_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = IngestConfig {
            encodings: vec!["utf-8".into()],
            arity: ArityPolicy::Strict,
            ..config(dir.path())
        };
        let progress = ProgressManager::new(false);
        let ingestor = Ingestor::new(&cfg, &progress).unwrap();
        let bad = write(dir.path(), "bad.sql", b"INSERT INTO geo VALUES (1,'\xFF\xFE',0,0);\n");
        let good = write(dir.path(), "good.sql", b"INSERT INTO geo VALUES (7,1.5,2.5,0);\n");

        let mut store = Store::open(&cfg.db_path).unwrap();
        let report = ingestor.ingest_dumps(&mut store, &[bad, good]).unwrap();
        assert_eq!(report.failed_files(), 1);
        assert!(report.files[0].error.as_deref().unwrap_or("").contains("decode"));
        assert_eq!(store.count_rows("geo").unwrap(), 1);
    }

    #[test]
    fn scan_import_dedupes_and_fills_both_tables() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let progress = ProgressManager::new(false);
        let ingestor = Ingestor::new(&cfg, &progress).unwrap();

        let mut fields = vec![""; 22];
        fields[8] = "AA:BB:CC:DD:EE:FF";
        fields[9] = "HomeNet";
        fields[11] = "s3cret";
        fields[19] = "55.75";
        fields[20] = "37.61";
        let line = fields.join("\t");
        let a = write(dir.path(), "a.txt", format!("# header\n{}\n", line).as_bytes());
        let b = write(dir.path(), "b.txt", format!("{}\n", line).as_bytes());

        let mut store = Store::open(&cfg.db_path).unwrap();
        let report = ingestor.ingest_scans(&mut store, &[a, b], true).unwrap();
        assert_eq!(report.duplicates_skipped, 1);
        assert_eq!(store.count_rows("nets").unwrap(), 1);
        assert_eq!(store.count_rows("geo").unwrap(), 1);
        assert_eq!(report.scan.map(|s| s.records), Some(2));
    }
}
