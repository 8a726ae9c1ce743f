//! RVP CLI - RISC-V Profiler

use clap::Parser;
use rvp::cli::Cli;
use rvp::commands;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG overrides; --verbose raises the default to debug.
    let directive = if cli.verbose { "rvp=debug" } else { "rvp=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse().unwrap()))
        .with_target(false)
        .init();

    std::process::exit(commands::run_command(&cli));
}
