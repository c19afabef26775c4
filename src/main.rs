mod cmd;

use anyhow::Result;
use clap::Parser;
use lyra_dev::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Dev(args) => cmd::dev::run(&args),
        Command::Preview(args) => cmd::preview::run(&args),
        Command::Upload(args) => cmd::upload::run(&args),
        Command::Resolve(args) => cmd::resolve::run(&args),
        Command::Config(config_cmd) => cmd::config::run(config_cmd),
    }
}
