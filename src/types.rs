//! Public and internal types for the fanpipe API and pipeline.

use anyhow::{Result, anyhow};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::utils::config::ChannelDefaults;
use crate::work::WorkKind;

/// Inclusive integer interval handed to exactly one worker.
///
/// A range with `lower > upper` is empty: the worker that receives it emits nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkRange {
    pub lower: i64,
    pub upper: i64,
}

impl WorkRange {
    pub const fn new(lower: i64, upper: i64) -> Self {
        Self { lower, upper }
    }

    pub fn is_empty(&self) -> bool {
        self.lower > self.upper
    }

    /// Number of items in the range (0 when empty). Saturates at `u64::MAX` for the full
    /// `i64::MIN..=i64::MAX` range.
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.upper.abs_diff(self.lower).saturating_add(1)
        }
    }

    /// Items in ascending order.
    pub fn iter(&self) -> std::ops::RangeInclusive<i64> {
        self.lower..=self.upper
    }
}

impl fmt::Display for WorkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

impl From<(i64, i64)> for WorkRange {
    fn from((lower, upper): (i64, i64)) -> Self {
        Self { lower, upper }
    }
}

/// Parses `a:b` or `a..=b` (both inclusive).
impl FromStr for WorkRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (lower, upper) = s
            .split_once("..=")
            .or_else(|| s.split_once(':'))
            .ok_or_else(|| anyhow!("invalid range '{s}': expected LOWER:UPPER or LOWER..=UPPER"))?;
        let lower = lower
            .trim()
            .parse::<i64>()
            .map_err(|e| anyhow!("invalid lower bound in '{s}': {e}"))?;
        let upper = upper
            .trim()
            .parse::<i64>()
            .map_err(|e| anyhow!("invalid upper bound in '{s}': {e}"))?;
        Ok(Self { lower, upper })
    }
}

/// Why the cancellation token fired. Only the first reason is kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The run's deadline elapsed.
    Timeout,
    /// The release handle was triggered, or the controller was dropped.
    Released,
    /// An external interrupt (Ctrl+C in the CLI).
    Interrupted,
    /// A work function failed in strict mode.
    Failed,
}

impl CancelReason {
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            CancelReason::Timeout => 1,
            CancelReason::Released => 2,
            CancelReason::Interrupted => 3,
            CancelReason::Failed => 4,
        }
    }

    pub(crate) const fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(CancelReason::Timeout),
            2 => Some(CancelReason::Released),
            3 => Some(CancelReason::Interrupted),
            4 => Some(CancelReason::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CancelReason::Timeout => "deadline elapsed",
            CancelReason::Released => "released",
            CancelReason::Interrupted => "interrupted",
            CancelReason::Failed => "work function failed",
        };
        f.write_str(s)
    }
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum Outcome {
    /// The merged stream closed: all data naturally exhausted.
    Completed,
    /// The token fired before the merged stream closed.
    Cancelled(CancelReason),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Result of one pipeline run.
#[derive(Clone, Debug, Serialize)]
pub struct PipelineReport {
    /// Accepted items in the order the sink received them.
    pub results: Vec<i64>,
    pub outcome: Outcome,
    /// Ranges the distributor handed to a worker before it stopped.
    pub ranges_sent: usize,
    /// Items whose work function returned an error (non-strict mode), with the message.
    pub failed_items: Vec<(i64, String)>,
    pub elapsed_ms: u64,
    /// Stage threads still alive after shutdown. Always 0 on return.
    pub outstanding_stages: usize,
}

impl PipelineReport {
    /// Results sorted ascending (arrival order is not deterministic across workers).
    pub fn sorted_results(&self) -> Vec<i64> {
        let mut r = self.results.clone();
        r.sort_unstable();
        r
    }
}

/// Lib options for [`run_pipeline_with`](crate::run_pipeline_with).
#[derive(Clone, Debug)]
pub struct PipelineOpts {
    /// Deadline for the whole run. `None` runs until the data is exhausted or the run is released.
    pub timeout: Option<Duration>,
    /// Capacity of every worker output channel and of the merged stream. 0 = rendezvous.
    pub channel_cap: usize,
    /// Strict mode: the first work function failure cancels the run and is returned as an error.
    pub strict: bool,
    /// Fires the run with [`CancelReason::Interrupted`] when a message arrives or every sender is dropped.
    pub interrupt: Option<Receiver<()>>,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        Self {
            timeout: Some(ChannelDefaults::TIMEOUT),
            channel_cap: ChannelDefaults::CAPACITY,
            strict: false,
            interrupt: None,
        }
    }
}

impl PipelineOpts {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }
}

/// Full options (CLI). Layered: defaults, then `.fanpipe.toml`, then flags.
#[derive(Clone, Debug)]
pub struct Opts {
    /// Explicit ranges. When empty, `span` is split instead.
    pub ranges: Vec<WorkRange>,
    /// One span to split into `workers` contiguous ranges.
    pub span: Option<WorkRange>,
    /// Split count for `span`. When None, uses available parallelism.
    pub workers: Option<usize>,
    pub work: WorkKind,
    /// Deadline in milliseconds. None = no deadline.
    pub timeout_ms: Option<u64>,
    /// Simulated cost per evaluated item in milliseconds.
    pub item_cost_ms: u64,
    pub channel_cap: usize,
    pub strict: bool,
    pub verbose: bool,
    /// Print the report as JSON instead of the colored summary.
    pub json: bool,
    /// Show a counter of received results.
    pub progress: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            ranges: Vec::new(),
            span: None,
            workers: None,
            work: WorkKind::default(),
            timeout_ms: Some(ChannelDefaults::TIMEOUT.as_millis() as u64),
            item_cost_ms: 0,
            channel_cap: ChannelDefaults::CAPACITY,
            strict: false,
            verbose: false,
            json: false,
            progress: false,
        }
    }
}
