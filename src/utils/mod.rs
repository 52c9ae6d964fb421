pub mod config;
pub mod fanpipe_toml;
pub mod logger;
pub mod signal;

pub use config::*;
pub use fanpipe_toml::{FanpipeToml, apply_file_to_opts, load_fanpipe_toml, parse_fanpipe_toml};
pub use logger::setup_logging;
pub use signal::install_interrupt_handler;
