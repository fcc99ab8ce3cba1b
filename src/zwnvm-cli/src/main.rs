mod cli;
mod commands;
mod file_io;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Mode};

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(_) => {
            eprint!("{}", cli::usage());
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_env("ZWNVM_LOG")
        .unwrap_or_else(|_| EnvFilter::new(cli.default_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let Some(mode) = cli.mode() else {
        eprint!("{}", cli::usage());
        std::process::exit(1);
    };

    if let Err(err) = run(mode, &cli) {
        eprintln!("ERROR: {err:#}");
        std::process::exit(1);
    }
}

fn run(mode: Mode, cli: &Cli) -> Result<()> {
    match mode {
        Mode::Export(format) => commands::export::run(format, &cli.src, &cli.dst),
        Mode::Import(format) => commands::import::run(format, &cli.src, &cli.dst),
    }
}
