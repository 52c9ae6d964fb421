//! Deadline controller and the cancellation token every stage observes.
//!
//! The token is a broadcast, level-triggered signal: its `done` channel has exactly one
//! sender, owned by the controller's watcher thread, and firing drops that sender. Every
//! clone of the receiver then observes disconnection forever, so any `select!` that
//! includes `recv(token.done())` wakes immediately once the token has fired.
//!
//! The fired state itself is an atomic holding the first [`CancelReason`] (0 = active),
//! so [`CancelToken::is_cancelled`] is visible to all stages as soon as the controller
//! records it, before the watcher has dropped the sender.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, after, bounded, never, select};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::CancelReason;
use crate::utils::config::PackageInfo;

const ACTIVE: u8 = 0;

#[derive(Debug, Default)]
struct TokenState {
    reason: AtomicU8,
}

impl TokenState {
    /// Record `reason` if the token is still active. Returns true for the call that fired it.
    fn fire(&self, reason: CancelReason) -> bool {
        self.reason
            .compare_exchange(ACTIVE, reason.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn reason(&self) -> Option<CancelReason> {
        CancelReason::from_u8(self.reason.load(Ordering::Acquire))
    }
}

/// Read-only view of a run's cancellation state. Cheap to clone; one per stage.
#[derive(Clone, Debug)]
pub struct CancelToken {
    state: Arc<TokenState>,
    done_rx: Receiver<()>,
}

impl CancelToken {
    /// True once the token has fired. Never resets.
    pub fn is_cancelled(&self) -> bool {
        self.state.reason().is_some()
    }

    /// First reason the token fired for, or None while active.
    pub fn reason(&self) -> Option<CancelReason> {
        self.state.reason()
    }

    /// Channel that never yields a value and disconnects when the token fires.
    /// Use as `recv(token.done()) -> _ => ...` inside `select!`.
    pub fn done(&self) -> &Receiver<()> {
        &self.done_rx
    }

    /// Block until the token fires or `timeout` elapses. Returns true if fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        select! {
            recv(self.done_rx) -> _ => true,
            default(timeout) => self.is_cancelled(),
        }
    }
}

/// Trigger side of a token. Clone freely; every clone fires the same token.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    state: Arc<TokenState>,
    wake_tx: Sender<()>,
}

impl CancelHandle {
    /// Fire the token with [`CancelReason::Released`]. Idempotent.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::Released);
    }

    /// Fire the token with `reason` unless it already fired. Idempotent.
    pub fn cancel_with(&self, reason: CancelReason) {
        if self.state.fire(reason) {
            debug!("cancellation requested: {}", reason);
        }
        // Full or disconnected both mean the watcher is already awake.
        let _ = self.wake_tx.try_send(());
    }
}

/// Owns the watcher thread that fires the token on timeout, explicit release or interrupt.
///
/// Dropping the controller releases the token and joins the watcher, so the watcher never
/// outlives the run.
pub struct DeadlineController {
    handle: CancelHandle,
    watcher: Option<JoinHandle<()>>,
}

impl DeadlineController {
    /// Start a token that fires after `timeout` (`None` = no deadline), when released, or when
    /// `interrupt` yields a message or disconnects. A zero timeout fires before this returns.
    pub fn start(
        timeout: Option<Duration>,
        interrupt: Option<Receiver<()>>,
    ) -> Result<(CancelToken, DeadlineController)> {
        let state = Arc::new(TokenState::default());
        let (done_tx, done_rx) = bounded::<()>(0);
        let (wake_tx, wake_rx) = bounded::<()>(1);

        if timeout.is_some_and(|t| t.is_zero()) {
            state.fire(CancelReason::Timeout);
            debug!("zero timeout: token fired at start");
        }

        let watcher_state = Arc::clone(&state);
        let watcher = thread::Builder::new()
            .name(PackageInfo::get().thread_name("deadline"))
            .spawn(move || watch(watcher_state, done_tx, wake_rx, timeout, interrupt))
            .context("spawn deadline watcher")?;

        let token = CancelToken { state: Arc::clone(&state), done_rx };
        let controller = DeadlineController {
            handle: CancelHandle { state, wake_tx },
            watcher: Some(watcher),
        };
        Ok((token, controller))
    }

    /// Handle that fires the token without consuming the controller.
    pub fn handle(&self) -> CancelHandle {
        self.handle.clone()
    }

    /// Fire the token (if still active) and wait for the watcher to exit.
    pub fn release(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.handle.cancel();
        if let Some(w) = self.watcher.take() {
            let _ = w.join();
        }
    }
}

impl Drop for DeadlineController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Watcher loop: wait for whichever comes first, record the reason, drop the done sender.
fn watch(
    state: Arc<TokenState>,
    done_tx: Sender<()>,
    wake_rx: Receiver<()>,
    timeout: Option<Duration>,
    interrupt: Option<Receiver<()>>,
) {
    let deadline = timeout.map(after).unwrap_or_else(never);
    let interrupt = interrupt.unwrap_or_else(never);
    // Already fired (zero timeout, or released before we got here): skip the wait.
    if state.reason().is_none() {
        select! {
            recv(wake_rx) -> _ => {
                // Wake comes only from a handle that has recorded its reason; disconnection
                // (all handles gone) counts as release.
                state.fire(CancelReason::Released);
            }
            recv(deadline) -> _ => {
                if state.fire(CancelReason::Timeout) {
                    debug!("deadline elapsed");
                }
            }
            recv(interrupt) -> _ => {
                if state.fire(CancelReason::Interrupted) {
                    log::warn!("interrupted; stopping pipeline");
                }
            }
        }
    }
    drop(done_tx);
}
