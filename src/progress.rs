// Progress bar management using indicatif.
// All bars live under one MultiProgress so they render on separate lines.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct ProgressManager {
    multi: Option<Arc<MultiProgress>>,
}

impl ProgressManager {
    // If enabled=false, no bars are created.
    pub fn new(enabled: bool) -> Self {
        let multi = if enabled {
            Some(Arc::new(MultiProgress::new()))
        } else {
            None
        };
        Self { multi }
    }

    // Byte progress through one input file.
    pub fn new_file_bar(&self, path: &Path, total_bytes: u64) -> Option<ProgressBar> {
        let mp = self.multi.as_ref()?;
        let bar = mp.add(ProgressBar::new(total_bytes));
        bar.set_style(byte_style());
        bar.set_prefix(basename(path));
        Some(bar)
    }

    // Item counter (recovery records, scan files).
    pub fn new_count_bar(&self, total: u64, label: &str) -> Option<ProgressBar> {
        let mp = self.multi.as_ref()?;
        let bar = mp.add(ProgressBar::new(total));
        bar.set_style(count_style());
        bar.set_prefix(label.to_string());
        Some(bar)
    }
}

fn byte_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:20} {bytes:>10}/{total_bytes:<10} [{bar:50}] {percent:>3}% {elapsed_precise}",
    )
    .expect("valid byte bar template")
    .progress_chars("█ ")
}

fn count_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:20} {pos:>9}/{len:<9} [{bar:50}] {percent:>3}%")
        .expect("valid count bar template")
        .progress_chars("█ ")
}

pub fn basename(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}
