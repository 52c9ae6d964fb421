//! fanpipe: cancellation-aware fan-out/fan-in work pipeline.
//!
//! A batch of inclusive integer ranges is handed out one range per worker thread, each
//! worker emits the items its work function accepts, a merger folds every worker output
//! into one stream, and the sink drains that stream on the caller's thread. A shared
//! cancellation token, fired by a deadline, an explicit release or an interrupt, is raced
//! against every blocking channel operation so a run always terminates and every thread
//! is joined before [`run_pipeline`] returns.

pub mod engine;
pub mod pipeline;
pub mod report;
pub mod types;
pub mod utils;
pub mod work;

/// Re-export types for API
pub use types::*;
pub use work::{Fallible, SharedWorkFunction, Throttled, WorkFunction, WorkKind, is_prime};

use log::debug;
use std::time::Duration;

/// Result alias used by public fanpipe API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use pipeline::{CancelHandle, CancelToken, DeadlineController};

/// Single entry point: evaluate `work` over every range in parallel with a deadline of `timeout`.
///
/// Items accepted before the deadline are logged and returned in the report; a timeout is a
/// normal [`Outcome::Cancelled`], not an error.
///
/// ```ignore
/// let ranges = [WorkRange::new(2, 10), WorkRange::new(11, 20)];
/// let report = fanpipe::run_pipeline(&ranges, Arc::new(fanpipe::is_prime), Duration::from_secs(5))?;
/// assert_eq!(report.sorted_results(), vec![2, 3, 5, 7, 11, 13, 17, 19]);
/// ```
pub fn run_pipeline(
    ranges: &[WorkRange],
    work: SharedWorkFunction,
    timeout: Duration,
) -> Result<PipelineReport> {
    pipeline::run_pipeline(ranges, work, timeout)
}

/// Full-options variant of [`run_pipeline`].
///
/// - **`on_result: None`** → results are only collected into the report.
/// - **`on_result: Some(f)`** → streaming; `f` runs on the caller's thread for each accepted item as it arrives. Keep it fast: the sink does not read the next item until it returns.
pub fn run_pipeline_with<F>(
    ranges: &[WorkRange],
    work: SharedWorkFunction,
    opts: &PipelineOpts,
    on_result: Option<F>,
) -> Result<PipelineReport>
where
    F: FnMut(i64),
{
    debug!(
        "{} CONFIG: timeout={:?} channel_cap={} strict={}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        opts.timeout,
        opts.channel_cap,
        opts.strict
    );
    pipeline::run_pipeline_with(ranges, work, opts, on_result)
}

/// Split `span` into `parts` contiguous ranges for use with [`run_pipeline`].
/// `parts: None` uses rayon's available thread count.
pub fn split_for_parallelism(span: WorkRange, parts: Option<usize>) -> Result<Vec<WorkRange>> {
    let parts = parts.unwrap_or_else(rayon::current_num_threads);
    engine::split_span(span, parts)
}
