#![doc = include_str!("../README.md")]

mod cli;

use std::io::{BufWriter, Write};

use clap::Parser;
use cli::config::{CliArgs, CliConfig};
use cli::telemetry::init_telemetry;

// Using mimalloc for steadier allocation behaviour in musl builds.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    init_telemetry(config.log_format)?;
    if cfg!(debug_assertions) {
        tracing::debug!("Starting with full config: {:#?}", config);
    }

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    cli::commands::run(&config, &mut out)?;
    out.flush()?;
    Ok(())
}
