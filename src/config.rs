// Run configuration, filled from the command line in main.rs.

use crate::error::{IngestError, Result};
use crate::parser::chunk::DEFAULT_CHUNK_SIZE;
use crate::schema::Layout;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexTier {
    Full,
    Basic,
    None,
}

impl IndexTier {
    // Whether an index declared at `required` is built under this tier.
    pub fn includes(self, required: IndexTier) -> bool {
        match (self, required) {
            (IndexTier::None, _) | (_, IndexTier::None) => false,
            (IndexTier::Full, _) => true,
            (IndexTier::Basic, IndexTier::Basic) => true,
            (IndexTier::Basic, IndexTier::Full) => false,
        }
    }
}

// What to do with tuples whose field count differs from the table arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArityPolicy {
    // Pad or truncate in place.
    Repair,
    // Reject and let recovery deal with it.
    Strict,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub db_path: PathBuf,
    pub layout: Layout,
    pub index_tier: IndexTier,
    pub batch_size: usize,
    // 0 = cores - 1.
    pub workers: usize,
    pub chunk_size: usize,
    pub encodings: Vec<String>,
    pub arity: ArityPolicy,
    pub recover: bool,
    pub optimize: bool,
    pub optimize_attempts: u32,
    pub optimize_backoff: Duration,
    pub error_dir: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("wifi.db"),
            layout: Layout::ThreeWifi,
            index_tier: IndexTier::Full,
            batch_size: 5_000,
            workers: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            encodings: vec![
                "utf-8".to_string(),
                "windows-1251".to_string(),
                "windows-1252".to_string(),
            ],
            arity: ArityPolicy::Repair,
            recover: true,
            optimize: true,
            optimize_attempts: 5,
            optimize_backoff: Duration::from_secs(3),
            error_dir: PathBuf::from("."),
        }
    }
}

impl IngestConfig {
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            num_cpus::get().saturating_sub(1).max(1)
        }
    }

    pub fn rejection_log_path(&self, table: &str) -> PathBuf {
        self.error_dir.join(format!("errors_{}.jsonl", table))
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestError::Config("batch size must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(IngestError::Config("chunk size must be at least 1".into()));
        }
        if self.encodings.is_empty() {
            return Err(IngestError::Config("no encodings configured".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_nest() {
        assert!(IndexTier::Full.includes(IndexTier::Full));
        assert!(IndexTier::Full.includes(IndexTier::Basic));
        assert!(IndexTier::Basic.includes(IndexTier::Basic));
        assert!(!IndexTier::Basic.includes(IndexTier::Full));
        assert!(!IndexTier::None.includes(IndexTier::Basic));
    }

    #[test]
    fn worker_count_is_at_least_one() {
        let cfg = IngestConfig::default();
        assert!(cfg.worker_count() >= 1);
        let fixed = IngestConfig {
            workers: 3,
            ..IngestConfig::default()
        };
        assert_eq!(fixed.worker_count(), 3);
    }

    #[test]
    fn validate_rejects_zero_batch() {
        let cfg = IngestConfig {
            batch_size: 0,
            ..IngestConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(IngestError::Config(_))));
        assert!(IngestConfig::default().validate().is_ok());
    }

    #[test]
    fn rejection_log_lives_in_error_dir() {
        let cfg = IngestConfig {
            error_dir: PathBuf::from("/tmp/x"),
            ..IngestConfig::default()
        };
        assert_eq!(
            cfg.rejection_log_path("geo"),
            PathBuf::from("/tmp/x/errors_geo.jsonl")
        );
    }
}
