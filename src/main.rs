//! fanpipe CLI: run the fan-out/fan-in pipeline once and print what it found.

use anyhow::Result;
use clap::Parser;
use fanpipe::engine::arg_parser::Cli;
use fanpipe::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
