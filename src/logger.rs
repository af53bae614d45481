// Logging setup. Components log through `tracing` at debug level; this module
// installs the stderr subscriber and remembers whether --debug was given.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

static DEBUG: AtomicBool = AtomicBool::new(false);

// RUST_LOG wins over the flag when set.
pub fn init(debug: bool) {
    DEBUG.store(debug, Ordering::Relaxed);
    let default = if debug {
        "sqldump_ingest=debug"
    } else {
        "sqldump_ingest=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// Progress bars and timing lines are tied to this.
pub fn is_debug() -> bool {
    DEBUG.load(Ordering::Relaxed)
}
