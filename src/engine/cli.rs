//! CLI command handler: layer config, build the work function, run the pipeline, report.

use anyhow::Result;
use log::debug;
use std::path::Path;
use std::time::Duration;

use crate::engine::arg_parser::Cli;
use crate::engine::progress::{create_counter, finish_bar, update_progress_bar};
use crate::engine::tools::{ranges_disjoint, resolve_ranges};
use crate::report::print_report;
use crate::utils::config::{DEFAULT_RANGES, WorkerLimits};
use crate::utils::{apply_file_to_opts, install_interrupt_handler, load_fanpipe_toml, setup_logging};
use crate::{Opts, PipelineOpts};

/// Overwrite opts field from CLI when the flag was given.
macro_rules! apply_cli_opt {
    ($cli:expr, $opts:expr, $cli_field:ident => $opts_field:ident) => {
        if let Some(v) = $cli.$cli_field {
            $opts.$opts_field = v;
        }
    };
}

/// Defaults, then `.fanpipe.toml` in `config_dir`, then CLI flags.
pub fn build_opts(cli: &Cli, config_dir: &Path) -> Opts {
    let mut opts = Opts::default();
    if let Some(file) = load_fanpipe_toml(config_dir) {
        apply_file_to_opts(&file, &mut opts);
    }
    if !cli.range.is_empty() {
        opts.ranges = cli.range.clone();
    }
    if cli.span.is_some() {
        opts.span = cli.span;
    }
    if cli.workers.is_some() {
        opts.workers = cli.workers;
    }
    if cli.timeout_ms.is_some() {
        opts.timeout_ms = cli.timeout_ms;
    }
    if cli.no_timeout {
        opts.timeout_ms = None;
    }
    apply_cli_opt!(cli, opts, work => work);
    apply_cli_opt!(cli, opts, item_cost_ms => item_cost_ms);
    apply_cli_opt!(cli, opts, channel_cap => channel_cap);
    apply_cli_opt!(cli, opts, strict => strict);
    apply_cli_opt!(cli, opts, json => json);
    apply_cli_opt!(cli, opts, progress => progress);
    apply_cli_opt!(cli, opts, verbose => verbose);
    opts
}

/// Run the pipeline once with the layered options and print the report.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = build_opts(cli, Path::new("."));
    setup_logging(opts.verbose);
    debug!("{:#?}", opts);

    let ranges = resolve_ranges(
        &opts.ranges,
        opts.span,
        opts.workers,
        WorkerLimits::current().all_threads,
        &DEFAULT_RANGES,
    )?;
    if !ranges_disjoint(&ranges) {
        log::warn!("Work ranges overlap; shared items will be reported once per range.");
    }

    let work = opts.work.build(Duration::from_millis(opts.item_cost_ms));
    let pipeline_opts = PipelineOpts {
        timeout: opts.timeout_ms.map(Duration::from_millis),
        channel_cap: opts.channel_cap,
        strict: opts.strict,
        interrupt: Some(install_interrupt_handler()?),
    };

    let bar = opts.progress.then(|| create_counter("results"));
    let report = crate::run_pipeline_with(
        &ranges,
        work,
        &pipeline_opts,
        Some(|_item: i64| {
            if let Some(bar) = &bar {
                update_progress_bar(bar, 1);
            }
        }),
    )?;
    if let Some(bar) = &bar {
        finish_bar(bar);
    }

    print_report(&report, opts.json)
}
