//! Sink: drain the merged stream on the caller's thread until it closes or the token fires.

use crossbeam_channel::{Receiver, select};
use log::{debug, info};

use crate::{CancelReason, Outcome};

use super::deadline::CancelToken;

/// What the sink saw before it returned.
#[derive(Clone, Debug)]
pub struct SinkSummary {
    /// Items in arrival order.
    pub results: Vec<i64>,
    pub outcome: Outcome,
}

/// Consume `merged`, reporting each item (info log, then `on_result`) in arrival order.
/// Returns when the stream closes (`Completed`) or the token fires (`Cancelled`).
pub fn consume<F>(token: &CancelToken, merged: &Receiver<i64>, mut on_result: F) -> SinkSummary
where
    F: FnMut(i64),
{
    let mut results = Vec::new();
    let outcome = loop {
        if let Some(reason) = token.reason() {
            break Outcome::Cancelled(reason);
        }
        select! {
            recv(merged) -> msg => match msg {
                Ok(item) => {
                    info!("result: {}", item);
                    on_result(item);
                    results.push(item);
                }
                Err(_) => {
                    debug!("sink: merged stream closed");
                    break Outcome::Completed;
                }
            },
            recv(token.done()) -> _ => {
                let reason = token.reason().unwrap_or(CancelReason::Released);
                break Outcome::Cancelled(reason);
            }
        }
    };
    if let Outcome::Cancelled(reason) = outcome {
        debug!("sink: stopping ({}) after {} results", reason, results.len());
    }
    SinkSummary { results, outcome }
}
