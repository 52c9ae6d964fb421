use clap::Parser;

use crate::WorkRange;
use crate::work::WorkKind;

/// Cancellation-aware fan-out/fan-in work pipeline.
#[derive(Clone, Debug, Parser)]
#[command(name = "fanpipe")]
#[command(about = "Evaluate a work function over integer ranges in parallel; stop cleanly on a deadline.")]
pub struct Cli {
    /// Work range LOWER:UPPER (inclusive), one worker each. Repeatable. Default: 2:10 11:20.
    #[arg(long, short = 'r', value_name = "LOWER:UPPER", allow_hyphen_values = true)]
    pub range: Vec<WorkRange>,

    /// Split one span LOWER:UPPER into --workers contiguous ranges. Ignored when --range is given.
    #[arg(long, short = 's', value_name = "LOWER:UPPER", allow_hyphen_values = true)]
    pub span: Option<WorkRange>,

    /// Number of ranges (and workers) to split --span into. Default: available threads.
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Work function applied to every item.
    #[arg(long, value_enum)]
    pub work: Option<WorkKind>,

    /// Deadline for the whole run in milliseconds. 0 cancels before any evaluation.
    #[arg(long, short = 't', conflicts_with = "no_timeout")]
    pub timeout_ms: Option<u64>,

    /// Run without a deadline (Ctrl+C still cancels).
    #[arg(long)]
    pub no_timeout: bool,

    /// Simulated cost per evaluated item in milliseconds.
    #[arg(long)]
    pub item_cost_ms: Option<u64>,

    /// Capacity of worker output channels and the merged stream. 0 = rendezvous.
    #[arg(long)]
    pub channel_cap: Option<usize>,

    /// Strict mode: fail the run on the first work function error.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub strict: Option<bool>,

    /// Print the report as JSON.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub json: Option<bool>,

    /// Show a counter of received results.
    #[arg(long, short = 'p', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub progress: Option<bool>,

    /// Verbose output (debug logging from every stage).
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}
