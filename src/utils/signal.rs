//! Ctrl+C forwarding into the deadline controller.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, bounded};

/// Install a Ctrl+C handler that sends on the returned receiver. Pass it as
/// [`PipelineOpts::interrupt`](crate::PipelineOpts::interrupt). Can only be installed once per process.
pub fn install_interrupt_handler() -> Result<Receiver<()>> {
    let (tx, rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        // Full means an interrupt is already pending.
        let _ = tx.try_send(());
    })
    .context("set Ctrl+C handler")?;
    Ok(rx)
}
