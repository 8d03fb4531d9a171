//! Argument parsing, grounded in `tools/monarch/src/main.rs`'s
//! `clap::Parser` usage.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "redis-mover", version, about = "Copies a Redis keyspace between deployments via DUMP/RESTORE")]
pub struct Cli {
    /// Source endpoint, as host[:port][#db]
    pub source: String,

    /// Destination endpoint, as host[:port][#db]
    pub destination: String,

    /// Stop after copying this many keys (default: copy everything)
    #[arg(long)]
    pub count: Option<u64>,

    /// Keys per DUMP/RESTORE pipeline batch
    #[arg(long, default_value_t = 10_000)]
    pub batch: usize,

    /// Number of existence-check workers (0 disables the check stage)
    #[arg(long, default_value_t = 0)]
    pub checkers: usize,

    /// Number of DUMP workers
    #[arg(long, default_value_t = 1)]
    pub readers: usize,

    /// Number of RESTORE workers
    #[arg(long, default_value_t = 1)]
    pub writers: usize,

    /// Count individual keys scanned/checked/read, not just batches
    /// (default: off). Per-item counters add overhead on large runs; pass
    /// this to get exact item totals in the progress table.
    #[arg(long, conflicts_with = "no_track_items")]
    pub track_items: bool,

    /// No-op; item tracking is off by default. Kept so existing
    /// invocations that pass it explicitly don't break.
    #[arg(long, conflicts_with = "track_items")]
    pub no_track_items: bool,

    /// Seconds between progress repaints
    #[arg(long, default_value_t = 1.0)]
    pub refresh_interval: f64,

    /// Verbose (debug-level) logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Defaults to `false`, matching the distilled implementation's
    /// `track_items=False` default; pass `--track-items` to turn it on.
    pub fn track_items(&self) -> bool {
        self.track_items
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(self.refresh_interval.max(0.01))
    }
}
