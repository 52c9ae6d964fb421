//! Load `.fanpipe.toml` from a directory (CLI only). Lib callers pass [`PipelineOpts`](crate::PipelineOpts) directly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::utils::config::PackageInfo;
use crate::work::WorkKind;
use crate::{Opts, WorkRange};

#[derive(Debug, Default, Deserialize)]
pub struct FanpipeToml {
    #[serde(default)]
    settings: RunSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunSection {
    ranges: Option<Vec<(i64, i64)>>,
    span: Option<(i64, i64)>,
    workers: Option<usize>,
    work: Option<WorkKind>,
    timeout_ms: Option<u64>,
    item_cost_ms: Option<u64>,
    channel_cap: Option<usize>,
    strict: Option<bool>,
    verbose: Option<bool>,
    json: Option<bool>,
    progress: Option<bool>,
}

/// Parse config text. Errors name the offending key.
pub fn parse_fanpipe_toml(s: &str) -> Result<FanpipeToml> {
    toml::from_str(s).context("parse fanpipe config")
}

/// Load `.fanpipe.toml` from `dir` if present. Returns None if the file is missing or invalid (invalid is logged).
pub fn load_fanpipe_toml(dir: &Path) -> Option<FanpipeToml> {
    let path = dir.join(PackageInfo::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_fanpipe_toml(&s)
        .map_err(|e| log::warn!("{}: {:#}", path.display(), e))
        .ok()
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $sec_field:ident => $opts_field:ident) => {
        if let Some(v) = $sec.$sec_field {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before applying CLI flags.
pub fn apply_file_to_opts(file: &FanpipeToml, opts: &mut Opts) {
    let sec = &file.settings;
    if let Some(ref ranges) = sec.ranges {
        opts.ranges = ranges.iter().copied().map(WorkRange::from).collect();
    }
    if let Some(span) = sec.span {
        opts.span = Some(WorkRange::from(span));
    }
    if let Some(n) = sec.workers {
        opts.workers = Some(n);
    }
    if let Some(ms) = sec.timeout_ms {
        opts.timeout_ms = Some(ms);
    }
    apply_file_opt!(sec, opts, work => work);
    apply_file_opt!(sec, opts, item_cost_ms => item_cost_ms);
    apply_file_opt!(sec, opts, channel_cap => channel_cap);
    apply_file_opt!(sec, opts, strict => strict);
    apply_file_opt!(sec, opts, verbose => verbose);
    apply_file_opt!(sec, opts, json => json);
    apply_file_opt!(sec, opts, progress => progress);
}
