//! Fan-in: one collector per worker output, forwarding into a single merged stream.

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded, select};
use log::debug;
use std::thread::JoinHandle;

use super::context::PipelineContext;

/// Merge `outs` into one stream.
///
/// Each collector gets a clone of the merged sender; the completion watcher keeps the
/// original and drops it only after joining every collector. The watcher's sender is
/// therefore always the last one alive, so the merged stream closes exactly once, after
/// the last collector retired, and never from a collector. The watcher returns the number
/// of items forwarded, or an error if a collector panicked.
pub fn merge(
    outs: Vec<Receiver<i64>>,
    channel_cap: usize,
    ctx: &PipelineContext,
) -> Result<(Receiver<i64>, JoinHandle<Result<usize>>)> {
    let (merged_tx, merged_rx) = bounded::<i64>(channel_cap);
    debug!("merging {} worker outputs", outs.len());

    let mut collectors = Vec::with_capacity(outs.len());
    for (idx, src) in outs.into_iter().enumerate() {
        let tx = merged_tx.clone();
        let c = ctx.clone();
        let spawned = ctx
            .tracker
            .spawn(&format!("collector-{idx}"), move || collect(idx, src, tx, &c));
        match spawned {
            Ok(h) => collectors.push(h),
            Err(e) => {
                ctx.abort_stages(collectors);
                return Err(e);
            }
        }
    }

    // Collectors are handed to the watcher only once it is running, so a failed spawn
    // can still join them here.
    let (back_tx, back_rx) = bounded::<Vec<JoinHandle<usize>>>(1);
    let spawned = ctx.tracker.spawn("merge-watcher", move || {
        let Ok(collectors) = back_rx.recv() else {
            return Ok(0);
        };
        let joined = join_collectors(collectors);
        drop(merged_tx);
        if let Ok(forwarded) = &joined {
            debug!("merged stream closed after {} items", forwarded);
        }
        joined
    });
    let watcher = match spawned {
        Ok(h) => h,
        Err(e) => {
            ctx.abort_stages(collectors);
            return Err(e);
        }
    };
    let _ = back_tx.send(collectors);

    Ok((merged_rx, watcher))
}

/// Join every collector and sum what they forwarded. All collectors are joined even when
/// one panicked; the first panic is then returned as an error.
pub fn join_collectors(collectors: Vec<JoinHandle<usize>>) -> Result<usize> {
    let mut forwarded = 0_usize;
    let mut panicked = None;
    for (idx, h) in collectors.into_iter().enumerate() {
        match h.join() {
            Ok(n) => forwarded += n,
            Err(_) => {
                panicked.get_or_insert(idx);
            }
        }
    }
    match panicked {
        Some(idx) => Err(anyhow!("collector {} thread panicked", idx)),
        None => Ok(forwarded),
    }
}

/// Collector loop: race the token against receive and against forward. Exits on
/// cancellation or when its source closes; never closes the merged stream itself.
fn collect(idx: usize, src: Receiver<i64>, merged_tx: Sender<i64>, ctx: &PipelineContext) -> usize {
    let token = &ctx.token;
    let mut forwarded = 0_usize;
    loop {
        if token.is_cancelled() {
            debug!("collector {}: cancelled", idx);
            break;
        }
        select! {
            recv(src) -> msg => match msg {
                Ok(item) => {
                    select! {
                        send(merged_tx, item) -> res => {
                            if res.is_err() {
                                debug!("collector {}: sink gone", idx);
                                break;
                            }
                            forwarded += 1;
                        }
                        recv(token.done()) -> _ => {
                            debug!("collector {}: cancelled while forwarding {}", idx, item);
                            break;
                        }
                    }
                }
                Err(_) => {
                    debug!("collector {}: worker output closed", idx);
                    break;
                }
            },
            recv(token.done()) -> _ => {
                debug!("collector {}: cancelled", idx);
                break;
            }
        }
    }
    forwarded
}
