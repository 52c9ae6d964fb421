//! Pipeline context: shared run state, per-stage channels and the stage tracker.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::WorkRange;
use crate::pipeline::deadline::{CancelHandle, CancelToken};
use crate::utils::config::PackageInfo;

/// Counts stage threads that are still running. Each spawned stage holds a [`StageGuard`]
/// that decrements the counter when the thread exits (including on panic).
#[derive(Clone, Debug, Default)]
pub struct StageTracker {
    live: Arc<AtomicUsize>,
}

impl StageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage threads that have been spawned and not yet exited.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    fn enter(&self) -> StageGuard {
        self.live.fetch_add(1, Ordering::AcqRel);
        StageGuard {
            live: Arc::clone(&self.live),
        }
    }

    /// Spawn a named stage thread tracked by this counter.
    pub fn spawn<T, F>(&self, stage: &str, f: F) -> Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.enter();
        let name = PackageInfo::get().thread_name(stage);
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _guard = guard;
                f()
            })
            .with_context(|| format!("spawn stage thread {name}"))
    }
}

/// Decrements the live-stage counter on drop.
pub struct StageGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// First failure message and all failed items, shared by every worker.
pub type FirstError = Arc<Mutex<Option<String>>>;
pub type FailedItems = Arc<Mutex<Vec<(i64, String)>>>;

/// Shared context for one run: token, trigger, strictness and failure bookkeeping.
/// Built in `run_pipeline_with` and cloned into every stage.
#[derive(Clone)]
pub struct PipelineContext {
    pub token: CancelToken,
    /// Used by workers in strict mode to fire the token on the first failure.
    pub cancel: CancelHandle,
    pub strict: bool,
    pub first_error: FirstError,
    pub failed_items: FailedItems,
    pub tracker: StageTracker,
}

impl PipelineContext {
    pub fn new(token: CancelToken, cancel: CancelHandle, strict: bool) -> Self {
        Self {
            token,
            cancel,
            strict,
            first_error: Arc::new(Mutex::new(None)),
            failed_items: Arc::new(Mutex::new(Vec::new())),
            tracker: StageTracker::new(),
        }
    }

    /// Cancel the run and join `handles`. Used when a later stage fails to spawn, so the
    /// stages already started never outlive the call. Their own results are discarded.
    pub fn abort_stages<T>(&self, handles: impl IntoIterator<Item = JoinHandle<T>>) {
        self.cancel.cancel();
        for h in handles {
            let _ = h.join();
        }
    }
}

/// Per-worker input channels, index-aligned with the ranges. The distributor takes the
/// senders, worker `i` takes receiver `i`.
pub struct InputChannels {
    pub senders: Vec<Sender<WorkRange>>,
    pub receivers: Vec<Receiver<WorkRange>>,
}

/// One rendezvous channel per worker slot: the distributor hands over a range only when
/// that worker is ready to take it.
pub fn create_input_channels(n: usize) -> InputChannels {
    let (senders, receivers) = (0..n).map(|_| bounded::<WorkRange>(0)).unzip();
    InputChannels {
        senders,
        receivers,
    }
}

/// Handles returned by the stage constructors; joined by the orchestrator after the sink returns.
pub struct PipelineHandles {
    pub distributor: JoinHandle<usize>,
    pub workers: Vec<JoinHandle<()>>,
    pub merger: JoinHandle<Result<usize>>,
}
