// Rejection log: one JSON-lines side file per table. Every record the
// pipeline could not load lands here, and recovery reads it back.

use crate::error::Result;
use crate::summary::TableSummary;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    ColumnCount,
    NestedParens,
    Fragment,
    Unterminated,
    Store,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub table: String,
    pub raw: String,
    pub reason: RejectReason,
    pub detail: String,
    pub fingerprint: String,
}

impl RejectedRecord {
    pub fn new(table: &str, raw: impl Into<String>, reason: RejectReason, detail: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            table: table.to_string(),
            fingerprint: fingerprint(&raw),
            raw,
            reason,
            detail: detail.into(),
        }
    }
}

// Short content hash so the same bad record can be spotted across runs.
pub fn fingerprint(raw: &str) -> String {
    let hash = blake3::hash(raw.as_bytes());
    hex::encode(&hash.as_bytes()[..8])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntry {
    Rejected(RejectedRecord),
    Failed(RejectedRecord),
    Summary(TableSummary),
}

pub struct RejectionLog {
    out: BufWriter<File>,
}

impl RejectionLog {
    // Start a fresh log for this run.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(Self {
            out: BufWriter::new(File::create(path)?),
        })
    }

    // Reopen an existing log to add recovery results and the summary line.
    pub fn append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    pub fn write(&mut self, entry: &LogEntry) -> Result<()> {
        serde_json::to_writer(&mut self.out, entry)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn rejected(&mut self, record: RejectedRecord) -> Result<()> {
        self.write(&LogEntry::Rejected(record))
    }

    pub fn failed(&mut self, record: RejectedRecord) -> Result<()> {
        self.write(&LogEntry::Failed(record))
    }

    pub fn summary(&mut self, summary: &TableSummary) -> Result<()> {
        self.write(&LogEntry::Summary(summary.clone()))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

impl Drop for RejectionLog {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

pub fn read_entries(path: &Path) -> Result<Vec<LogEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

// Records still waiting for recovery; a missing log means nothing was rejected.
pub fn read_rejections(path: &Path) -> Result<Vec<RejectedRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(read_entries(path)?
        .into_iter()
        .filter_map(|entry| match entry {
            LogEntry::Rejected(record) => Some(record),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_round_trips_through_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors_base.jsonl");

        let mut log = RejectionLog::create(&path).unwrap();
        log.rejected(RejectedRecord::new("base", "(1,'a", RejectReason::Unterminated, ""))
            .unwrap();
        log.rejected(RejectedRecord::new("base", "'x',2)", RejectReason::Fragment, ""))
            .unwrap();
        drop(log);

        let mut log = RejectionLog::append(&path).unwrap();
        log.failed(RejectedRecord::new("base", "'x',2)", RejectReason::Fragment, "still bad"))
            .unwrap();
        log.summary(&TableSummary {
            table: "base".into(),
            failed: 2,
            ..TableSummary::default()
        })
        .unwrap();
        drop(log);

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 4);
        assert!(matches!(entries[2], LogEntry::Failed(_)));
        assert!(matches!(entries[3], LogEntry::Summary(ref s) if s.failed == 2));

        let pending = read_rejections(&path).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].raw, "(1,'a");
        assert_eq!(pending[1].reason, RejectReason::Fragment);
    }

    #[test]
    fn create_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("errors_geo.jsonl");
        std::fs::write(&path, "stale\n").unwrap();
        let log = RejectionLog::create(&path).unwrap();
        drop(log);
        assert!(read_rejections(&path).unwrap().is_empty());
    }

    #[test]
    fn entries_are_tagged_by_kind() {
        let rec = RejectedRecord::new("geo", "(1)", RejectReason::Store, "NOT NULL");
        let json = serde_json::to_string(&LogEntry::Rejected(rec.clone())).unwrap();
        assert!(json.starts_with(r#"{"kind":"rejected""#));
        assert!(json.contains(r#""reason":"store""#));
        assert_eq!(rec.fingerprint.len(), 16);
        assert_eq!(rec.fingerprint, fingerprint("(1)"));
    }

    #[test]
    fn missing_log_has_no_rejections() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_rejections(&dir.path().join("none.jsonl"))
            .unwrap()
            .is_empty());
    }
}
