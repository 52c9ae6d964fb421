//! Pipeline components: deadline, distributor, workers, merger, sink and the orchestrator
//! that wires them together.
//!
//! Data: distributor → worker `i` (one range each) → collector `i` → merged stream → sink.
//! Control: the deadline controller's token is cloned into every stage and raced against
//! every blocking send and receive.

pub mod context;
pub mod deadline;
pub mod distributor;
pub mod error_handler;
pub mod merger;
pub mod orchestrator;
pub mod sink;
pub mod worker;

pub use context::{
    FailedItems, FirstError, InputChannels, PipelineContext, PipelineHandles, StageGuard,
    StageTracker, create_input_channels,
};
pub use deadline::{CancelHandle, CancelToken, DeadlineController};
pub use distributor::{run_distributor, spawn_distributor};
pub use error_handler::check_for_first_error_or_failed_items;
pub use merger::{join_collectors, merge};
pub use orchestrator::{
    run_pipeline, run_pipeline_with, shutdown_pipeline_handles, start_stages, validate_ranges,
};
pub use sink::{SinkSummary, consume};
pub use worker::{spawn_worker, spawn_workers};
