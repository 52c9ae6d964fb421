//! Worker stage: receive one range, evaluate every item, emit accepted items in ascending order.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use log::{debug, warn};
use std::thread::JoinHandle;

use crate::work::SharedWorkFunction;
use crate::{CancelReason, WorkRange};

use super::context::PipelineContext;

/// Start one worker for input channel `input_rx`. Returns its output receiver immediately;
/// evaluation runs on the spawned thread, which is the only owner of the output sender.
pub fn spawn_worker(
    idx: usize,
    input_rx: Receiver<WorkRange>,
    work: SharedWorkFunction,
    channel_cap: usize,
    ctx: &PipelineContext,
) -> Result<(Receiver<i64>, JoinHandle<()>)> {
    let (out_tx, out_rx) = bounded::<i64>(channel_cap);
    let ctx = ctx.clone();
    let handle = ctx
        .tracker
        .clone()
        .spawn(&format!("worker-{idx}"), move || {
            worker_loop(idx, input_rx, out_tx, work, &ctx)
        })?;
    Ok((out_rx, handle))
}

/// Spawn one worker per input receiver (index-aligned). Returns output receivers in the same order.
pub fn spawn_workers(
    input_rxs: Vec<Receiver<WorkRange>>,
    work: &SharedWorkFunction,
    channel_cap: usize,
    ctx: &PipelineContext,
) -> Result<(Vec<Receiver<i64>>, Vec<JoinHandle<()>>)> {
    let mut outs = Vec::with_capacity(input_rxs.len());
    let mut handles = Vec::with_capacity(input_rxs.len());
    for (idx, input_rx) in input_rxs.into_iter().enumerate() {
        match spawn_worker(idx, input_rx, work.clone(), channel_cap, ctx) {
            Ok((out_rx, handle)) => {
                outs.push(out_rx);
                handles.push(handle);
            }
            Err(e) => {
                ctx.abort_stages(handles);
                return Err(e);
            }
        }
    }
    Ok((outs, handles))
}

/// Single worker: race the token against the one range, then evaluate it. Every emission
/// also races the token and the token is checked between items, so a cancelled run stops
/// mid-range; an evaluation already started runs to completion. `out_tx` is dropped on
/// return, which closes this worker's output.
fn worker_loop(
    idx: usize,
    input_rx: Receiver<WorkRange>,
    out_tx: Sender<i64>,
    work: SharedWorkFunction,
    ctx: &PipelineContext,
) {
    let token = &ctx.token;
    if token.is_cancelled() {
        debug!("worker {}: cancelled before receiving", idx);
        return;
    }
    let range = select! {
        recv(input_rx) -> msg => match msg {
            Ok(range) => range,
            Err(_) => {
                debug!("worker {}: input closed without a range", idx);
                return;
            }
        },
        recv(token.done()) -> _ => {
            debug!("worker {}: cancelled while waiting for input", idx);
            return;
        }
    };
    debug!("worker {}: evaluating {}", idx, range);

    let mut emitted = 0_usize;
    for item in range.iter() {
        if token.is_cancelled() {
            debug!("worker {}: cancelled at item {}", idx, item);
            break;
        }
        match work.evaluate(item) {
            Ok(true) => {
                select! {
                    send(out_tx, item) -> res => {
                        if res.is_err() {
                            // Collector gone: nobody left to read this output.
                            break;
                        }
                        emitted += 1;
                    }
                    recv(token.done()) -> _ => {
                        debug!("worker {}: cancelled while emitting {}", idx, item);
                        break;
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                if record_failure(item, &e, ctx) {
                    break;
                }
            }
        }
    }
    drop(out_tx);
    debug!("worker {}: done, {} items emitted", idx, emitted);
}

/// Record a failed item. In strict mode the first failure is kept and the run is cancelled;
/// returns true when the worker should stop.
fn record_failure(item: i64, err: &anyhow::Error, ctx: &PipelineContext) -> bool {
    let msg = format!("{:#}", err);
    if ctx.strict {
        ctx.first_error
            .lock()
            .unwrap()
            .get_or_insert_with(|| format!("strict mode: item {}: {}", item, msg));
        ctx.cancel.cancel_with(CancelReason::Failed);
        return true;
    }
    warn!("work function failed for item {}: {}", item, msg);
    ctx.failed_items.lock().unwrap().push((item, msg));
    false
}
