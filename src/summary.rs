// Per-table and per-file results collected by the pipeline and printed by main.

use crate::loader::LoadCounters;
use crate::parser::routerscan::ScanStats;
use crate::recovery::RecoveryReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub table: String,
    pub normal: u64,
    pub fixed: u64,
    pub ignored: u64,
    pub failed: u64,
    pub recovered: u64,
    pub salvaged: u64,
    pub permanently_failed: u64,
    pub rows_in_store: u64,
}

impl TableSummary {
    pub fn new(
        table: &str,
        load: LoadCounters,
        recovery: Option<RecoveryReport>,
        rows_in_store: u64,
    ) -> Self {
        let recovery = recovery.unwrap_or_default();
        Self {
            table: table.to_string(),
            normal: load.normal,
            fixed: load.fixed,
            ignored: load.ignored + recovery.ignored,
            failed: load.failed,
            recovered: recovery.recovered,
            salvaged: recovery.salvaged,
            permanently_failed: recovery.permanently_failed,
            rows_in_store,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub chunks: u64,
    pub statements: u64,
    // Scan records parsed from the file.
    pub records: u64,
    // INSERTs into tables outside the layout.
    pub skipped_statements: u64,
    // Non-record lines in scan exports.
    pub skipped_lines: u64,
    pub elapsed_ms: u128,
    pub error: Option<String>,
}

impl FileReport {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizeReport {
    pub attempts: u32,
    pub completed: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    pub tables: Vec<TableSummary>,
    pub indexes_created: usize,
    pub duplicates_skipped: u64,
    pub scan: Option<ScanStats>,
    pub optimize: Option<OptimizeReport>,
    pub elapsed_ms: u128,
}

impl RunReport {
    pub fn failed_files(&self) -> usize {
        self.files.iter().filter(|f| f.error.is_some()).count()
    }
}
