//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackageInfo {
    config_filename: String,
    thread_prefix: String,
}

static PACKAGE_INFO: OnceLock<PackageInfo> = OnceLock::new();

impl PackageInfo {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackageInfo {
        PACKAGE_INFO.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackageInfo {
                config_filename: format!(".{pkg}.toml"),
                thread_prefix: format!("{pkg}-"),
            }
        })
    }

    /// Config file looked up in the working directory (CLI only).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Prefix for stage thread names, e.g. `fanpipe-worker-3`.
    pub fn thread_name(&self, stage: &str) -> String {
        format!("{}{}", self.thread_prefix, stage)
    }
}

// ---- Workers ----

/// Limits for how many ranges (and therefore worker threads) one run may use.
/// Use [`WorkerLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerLimits {
    /// Available threads (from rayon); set by [`WorkerLimits::current()`].
    pub all_threads: usize,
    /// Hard cap on ranges per run (one thread each).
    pub max_ranges: usize,
}

impl Default for WorkerLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            max_ranges: Self::MAX_RANGES,
        }
    }
}

impl WorkerLimits {
    pub const MAX_RANGES: usize = 1024;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }
}

// ---- Channels / deadline ----

/// Defaults for channel sizing and the run deadline.
pub struct ChannelDefaults;

impl ChannelDefaults {
    /// Worker output and merged stream capacity. 0 = rendezvous hand-off.
    pub const CAPACITY: usize = 0;
    /// Default run deadline.
    pub const TIMEOUT: Duration = Duration::from_secs(5);
}

// ---- Default input ----

/// Ranges used when neither ranges nor a span are configured.
pub const DEFAULT_RANGES: [(i64, i64); 2] = [(2, 10), (11, 20)];

/// When the run reports more results than this, the summary prints a count instead of every item.
pub const LIST_THRESHOLD: usize = 100;
