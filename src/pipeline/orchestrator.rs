use anyhow::{Result, anyhow};
use log::{debug, info};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::pipeline::{self, DeadlineController, PipelineContext, PipelineHandles};
use crate::utils::config::WorkerLimits;
use crate::work::SharedWorkFunction;
use crate::{PipelineOpts, PipelineReport, WorkRange};

/// Reject runs with no ranges or more ranges than [`WorkerLimits::MAX_RANGES`] (one thread each).
pub fn validate_ranges(ranges: &[WorkRange]) -> Result<()> {
    if ranges.is_empty() {
        return Err(anyhow!("no work ranges given"));
    }
    let max = WorkerLimits::current().max_ranges;
    if ranges.len() > max {
        return Err(anyhow!(
            "{} work ranges exceeds the limit of {} (one worker thread per range)",
            ranges.len(),
            max
        ));
    }
    Ok(())
}

/// Spawn workers, merger and distributor in that order, so every receiver exists before
/// the distributor starts sending. Returns the merged stream and the stage handles.
///
/// If a stage fails to spawn, the run is cancelled and every stage already started is
/// joined before the error is returned.
pub fn start_stages(
    ranges: &[WorkRange],
    work: &SharedWorkFunction,
    channel_cap: usize,
    ctx: &PipelineContext,
) -> Result<(crossbeam_channel::Receiver<i64>, PipelineHandles)> {
    let inputs = pipeline::create_input_channels(ranges.len());
    let (outs, workers) = pipeline::spawn_workers(inputs.receivers, work, channel_cap, ctx)?;
    let (merged_rx, merger) = match pipeline::merge(outs, channel_cap, ctx) {
        Ok(merged) => merged,
        Err(e) => {
            ctx.abort_stages(workers);
            return Err(e);
        }
    };
    let distributor = match pipeline::spawn_distributor(ranges.to_vec(), inputs.senders, ctx) {
        Ok(h) => h,
        Err(e) => {
            ctx.abort_stages(workers);
            ctx.abort_stages([merger]);
            return Err(e);
        }
    };
    Ok((
        merged_rx,
        PipelineHandles {
            distributor,
            workers,
            merger,
        },
    ))
}

/// Join every stage thread. Returns the number of ranges the distributor sent.
pub fn shutdown_pipeline_handles(handles: PipelineHandles) -> Result<usize> {
    let PipelineHandles {
        distributor,
        workers,
        merger,
    } = handles;
    let sent = join_stage(distributor, "distributor")?;
    for (idx, h) in workers.into_iter().enumerate() {
        join_stage(h, &format!("worker {idx}"))?;
    }
    let forwarded = join_stage(merger, "merger")??;
    debug!("shutdown: {} ranges sent, {} items merged", sent, forwarded);
    Ok(sent)
}

fn join_stage<T>(h: JoinHandle<T>, name: &str) -> Result<T> {
    h.join().map_err(|_| anyhow!("{} thread panicked", name))
}

/// Run the full pipeline: distribute `ranges` over one worker each, merge, and drain into
/// the sink on this thread. `on_result` sees every accepted item in arrival order.
///
/// Returns once the sink has returned and every stage thread has been joined. Cancellation
/// (timeout, release, interrupt) is a normal outcome, not an error; only strict-mode work
/// failures and stage panics are errors.
pub fn run_pipeline_with<F>(
    ranges: &[WorkRange],
    work: SharedWorkFunction,
    opts: &PipelineOpts,
    on_result: Option<F>,
) -> Result<PipelineReport>
where
    F: FnMut(i64),
{
    validate_ranges(ranges)?;
    let start = Instant::now();
    info!(
        "Running {} ranges, timeout {}",
        ranges.len(),
        opts.timeout
            .map(|t| format!("{:?}", t))
            .unwrap_or_else(|| "none".to_string())
    );

    // Dropping the controller on any early return fires the token, so stages already
    // spawned still exit.
    let (token, deadline) = DeadlineController::start(opts.timeout, opts.interrupt.clone())?;
    let ctx = PipelineContext::new(token.clone(), deadline.handle(), opts.strict);

    let (merged_rx, handles) = start_stages(ranges, &work, opts.channel_cap, &ctx)?;

    let summary = match on_result {
        Some(f) => pipeline::consume(&token, &merged_rx, f),
        None => pipeline::consume(&token, &merged_rx, |_| {}),
    };

    // Sink is done: release the token so nothing keeps working for a reader that is gone.
    deadline.release();
    drop(merged_rx);
    let ranges_sent = shutdown_pipeline_handles(handles)?;

    pipeline::check_for_first_error_or_failed_items(
        ctx.strict,
        &ctx.first_error,
        &ctx.failed_items,
    )?;

    let failed_items = std::mem::take(&mut *ctx.failed_items.lock().unwrap());
    let report = PipelineReport {
        results: summary.results,
        outcome: summary.outcome,
        ranges_sent,
        failed_items,
        elapsed_ms: start.elapsed().as_millis() as u64,
        outstanding_stages: ctx.tracker.live(),
    };
    debug!(
        "pipeline terminated: {:?}, {} results in {} ms",
        report.outcome,
        report.results.len(),
        report.elapsed_ms
    );
    Ok(report)
}

/// Single entry point: run `work` over `ranges` with a deadline of `timeout`.
pub fn run_pipeline(
    ranges: &[WorkRange],
    work: SharedWorkFunction,
    timeout: Duration,
) -> Result<PipelineReport> {
    run_pipeline_with(
        ranges,
        work,
        &PipelineOpts::with_timeout(timeout),
        None::<fn(i64)>,
    )
}
