//! Command-line front-end for the batch engine.
mod cli;
mod platform;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    platform::run_app(args)
}
