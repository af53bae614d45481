// Batch loader: buffers normalized rows per table and commits them in
// transactions. A failing batch is rolled back and replayed one row at a
// time so a single bad row costs only itself.

use crate::error::Result;
use crate::normalize::{Fit, NormalizedRow};
use crate::rejects::{RejectReason, RejectedRecord, RejectionLog};
use crate::schema::TableSpec;
use rusqlite::{params_from_iter, Connection};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct LoadCounters {
    // Inserted as parsed.
    pub normal: u64,
    // Inserted after padding or truncation.
    pub fixed: u64,
    // Dropped by a uniqueness conflict.
    pub ignored: u64,
    // Sent to the rejection log.
    pub failed: u64,
}

impl LoadCounters {
    fn tally(&mut self, row: &NormalizedRow, inserted: bool) {
        match (inserted, row.fit()) {
            (false, _) => self.ignored += 1,
            (true, Fit::Exact) => self.normal += 1,
            (true, _) => self.fixed += 1,
        }
    }
}

// Insert `rows` in one transaction. Returns whether each row was stored
// (false = skipped by ON CONFLICT DO NOTHING).
pub(crate) fn insert_rows(
    conn: &mut Connection,
    sql: &str,
    rows: &[NormalizedRow],
) -> rusqlite::Result<Vec<bool>> {
    let tx = conn.transaction()?;
    let mut inserted = Vec::with_capacity(rows.len());
    {
        let mut stmt = tx.prepare_cached(sql)?;
        for row in rows {
            let changed = stmt.execute(params_from_iter(row.values()))?;
            inserted.push(changed > 0);
        }
    }
    tx.commit()?;
    Ok(inserted)
}

pub struct TableLoader {
    spec: &'static TableSpec,
    insert_sql: String,
    batch_size: usize,
    pending: Vec<NormalizedRow>,
    counters: LoadCounters,
    rejects: RejectionLog,
}

impl TableLoader {
    pub fn new(spec: &'static TableSpec, batch_size: usize, rejects: RejectionLog) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            spec,
            insert_sql: spec.insert_sql(),
            batch_size,
            pending: Vec::with_capacity(batch_size),
            counters: LoadCounters::default(),
            rejects,
        }
    }

    pub fn spec(&self) -> &'static TableSpec {
        self.spec
    }

    pub fn push(&mut self, conn: &mut Connection, row: NormalizedRow) -> Result<()> {
        self.pending.push(row);
        if self.pending.len() >= self.batch_size {
            self.flush(conn)?;
        }
        Ok(())
    }

    // Parse-stage rejects go through the loader so log writes stay on one thread.
    pub fn reject(&mut self, record: RejectedRecord) -> Result<()> {
        self.counters.failed += 1;
        self.rejects.rejected(record)
    }

    pub fn flush(&mut self, conn: &mut Connection) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.pending);
        match insert_rows(conn, &self.insert_sql, &rows) {
            Ok(inserted) => {
                for (row, ok) in rows.iter().zip(inserted) {
                    self.counters.tally(row, ok);
                }
            }
            Err(e) => {
                tracing::debug!(
                    table = self.spec.name,
                    rows = rows.len(),
                    "batch failed ({}), retrying row by row",
                    e
                );
                self.replay(conn, &rows)?;
            }
        }
        self.pending = rows;
        self.pending.clear();
        Ok(())
    }

    fn replay(&mut self, conn: &mut Connection, rows: &[NormalizedRow]) -> Result<()> {
        for row in rows {
            match insert_rows(conn, &self.insert_sql, std::slice::from_ref(row)) {
                Ok(inserted) => self.counters.tally(row, inserted[0]),
                Err(e) => {
                    let record = RejectedRecord::new(
                        self.spec.name,
                        row.render(),
                        RejectReason::Store,
                        e.to_string(),
                    );
                    self.reject(record)?;
                }
            }
        }
        Ok(())
    }

    // Flush what is left and hand back the counters and the log.
    pub fn finish(mut self, conn: &mut Connection) -> Result<(LoadCounters, RejectionLog)> {
        self.flush(conn)?;
        self.rejects.flush()?;
        Ok((self.counters, self.rejects))
    }
}
