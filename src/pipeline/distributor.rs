//! Input distributor: hands range `i` to worker `i`, racing every send against the token.

use anyhow::Result;
use crossbeam_channel::{Sender, select};
use log::debug;
use std::thread::JoinHandle;

use crate::WorkRange;

use super::context::PipelineContext;

/// Spawn the distributor thread. It owns every input sender and drops all of them when it
/// returns, on the normal path and on cancellation alike, so no worker waits on a range
/// that will never come. The thread returns the number of ranges actually sent.
pub fn spawn_distributor(
    ranges: Vec<WorkRange>,
    senders: Vec<Sender<WorkRange>>,
    ctx: &PipelineContext,
) -> Result<JoinHandle<usize>> {
    let ctx = ctx.clone();
    ctx.tracker
        .clone()
        .spawn("distributor", move || run_distributor(ranges, senders, &ctx))
}

/// Send loop. Takes the senders by value: returning (or unwinding) drops them, which is
/// the only close of each input channel.
pub fn run_distributor(
    ranges: Vec<WorkRange>,
    senders: Vec<Sender<WorkRange>>,
    ctx: &PipelineContext,
) -> usize {
    let token = &ctx.token;
    let mut sent = 0_usize;
    for (idx, (range, tx)) in ranges.into_iter().zip(senders.iter()).enumerate() {
        if token.is_cancelled() {
            debug!("cancelled before sending range {} to worker {}", range, idx);
            break;
        }
        select! {
            send(tx, range) -> res => match res {
                Ok(()) => {
                    debug!("sent range {} to worker {}", range, idx);
                    sent += 1;
                }
                // Worker already gone (it saw cancellation first); nothing to hand over.
                Err(_) => debug!("worker {} not receiving; range {} dropped", idx, range),
            },
            recv(token.done()) -> _ => {
                debug!("cancelled while sending range {} to worker {}", range, idx);
                break;
            }
        }
    }
    drop(senders);
    debug!("distributor done: {} ranges sent, input channels closed", sent);
    sent
}
