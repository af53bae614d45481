// Store: the single SQLite connection plus schema, index and maintenance
// helpers that run before and after the load.

use crate::config::IndexTier;
use crate::error::Result;
use crate::schema::TableSpec;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const BUSY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizeOutcome {
    Done { attempts: u32 },
    GaveUp { attempts: u32, last_error: String },
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::tune(&conn)?;
        tracing::debug!(path = %path.display(), "store opened");
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::tune(&conn)?;
        Ok(Self { conn })
    }

    fn tune(conn: &Connection) -> Result<()> {
        // journal_mode answers with the resulting mode, so it cannot go
        // through execute_batch.
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.execute_batch(
            "PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = 10000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = OFF;",
        )?;
        Ok(())
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn create_tables(&self, tables: &[&TableSpec]) -> Result<()> {
        for spec in tables {
            self.conn.execute_batch(&spec.create_sql())?;
        }
        Ok(())
    }

    // Returns the number of CREATE INDEX statements issued.
    pub fn create_indexes(&self, tables: &[&TableSpec], tier: IndexTier) -> Result<usize> {
        let mut created = 0;
        for spec in tables {
            for sql in spec.index_sql(tier) {
                tracing::debug!("{}", sql);
                self.conn.execute_batch(&sql)?;
                created += 1;
            }
        }
        Ok(created)
    }

    pub fn count_rows(&self, table: &str) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
        Ok(n as u64)
    }

    // ANALYZE + optimize + VACUUM, retried on failure. Never an error: a
    // database that could not be compacted is still a complete database.
    pub fn optimize(&self, policy: RetryPolicy) -> OptimizeOutcome {
        let attempts = policy.attempts.max(1);
        let mut last_error = String::new();
        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(policy.base_delay * (attempt + 1));
            }
            match self
                .conn
                .execute_batch("ANALYZE; PRAGMA optimize; VACUUM;")
            {
                Ok(()) => {
                    return OptimizeOutcome::Done {
                        attempts: attempt + 1,
                    }
                }
                Err(e) => {
                    tracing::debug!(attempt = attempt + 1, "optimize failed: {}", e);
                    last_error = e.to_string();
                }
            }
        }
        OptimizeOutcome::GaveUp {
            attempts,
            last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Layout, GEO};

    #[test]
    fn schema_creation_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let tables = Layout::P3Wifi.tables();
        store.create_tables(tables).unwrap();
        store.create_tables(tables).unwrap();
        assert_eq!(store.count_rows("nets").unwrap(), 0);
        assert_eq!(store.create_indexes(tables, IndexTier::Basic).unwrap(), 5);
        assert_eq!(store.create_indexes(tables, IndexTier::Full).unwrap(), 9);
        assert_eq!(store.create_indexes(tables, IndexTier::None).unwrap(), 0);
    }

    #[test]
    fn file_store_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(&dir.path().join("t.db")).unwrap();
        let mode: String = store
            .conn_mut()
            .query_row("PRAGMA journal_mode", [], |r| r.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn optimize_succeeds_on_idle_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("t.db")).unwrap();
        store.create_tables(&[&GEO]).unwrap();
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::ZERO,
        };
        assert_eq!(store.optimize(policy), OptimizeOutcome::Done { attempts: 1 });
    }

    #[test]
    fn optimize_gives_up_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let store = Store::open_with_timeout(&path, Duration::ZERO).unwrap();
        store.create_tables(&[&GEO]).unwrap();

        let other = Connection::open(&path).unwrap();
        other.execute_batch("BEGIN EXCLUSIVE;").unwrap();

        let policy = RetryPolicy {
            attempts: 2,
            base_delay: Duration::ZERO,
        };
        match store.optimize(policy) {
            OptimizeOutcome::GaveUp { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert!(!last_error.is_empty());
            }
            other => panic!("expected GaveUp, got {:?}", other),
        }
        other.execute_batch("ROLLBACK;").unwrap();
    }
}
