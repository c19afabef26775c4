use anyhow::{Context, Result};
use lyra_dev::cli::DevArgs;
use lyra_dev::session::{self, SessionOptions};
use tokio::runtime::Runtime;

pub fn run(args: &DevArgs) -> Result<()> {
    let rt = Runtime::new().context("failed to start tokio runtime for the dev session")?;
    rt.block_on(session::run(SessionOptions {
        subcommand: args.subcommand.clone(),
        target_h5_url: args.target_h5_url.clone(),
    }))
}
