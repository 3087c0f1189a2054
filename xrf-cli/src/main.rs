//! `xrf`: attenuation tables, detector escape peaks and multilayer
//! fluorescence from the command line. Results are printed as JSON.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use log::LevelFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    commands::run(cli.command, cli.data_dir)
}
