//! Engine module: CLI parsing and handling, progress display, range utilities

pub mod arg_parser;
pub mod cli;
pub mod progress;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::Cli;
pub use cli::{build_opts, handle_run};
pub use tools::{ranges_disjoint, resolve_ranges, split_span};
