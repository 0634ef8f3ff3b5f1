//! Indexpipe CLI: run a full rebuild (--rebuild) or an update from a fixture catalog.

use anyhow::Result;
use clap::Parser;
use indexpipe::engine::arg_parser::Cli;
use indexpipe::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
