use anyhow::{Context, Result};
use lyra_dev::actions::{Collaborators, DelegateCollaborators};
use lyra_dev::cli::UploadArgs;
use lyra_dev::config;
use lyra_dev::project::{self, PROJECT_RC_NAME, ProjectMode};
use tokio::runtime::Runtime;

pub fn run(_args: &UploadArgs) -> Result<()> {
    let working_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let mode = project::load(&working_dir).unwrap_or_default().mode();
    let Some(mode) = mode else {
        eprintln!(
            "No {PROJECT_RC_NAME} with a supported project type found under {}.",
            working_dir.display()
        );
        return Ok(());
    };
    if mode == ProjectMode::H5 {
        eprintln!("`upload` only supports mini-programs and workbench plugins");
        return Ok(());
    }

    let tool_config = config::load()?;
    let collaborators = DelegateCollaborators::from_config(&tool_config);
    let rt = Runtime::new().context("failed to start tokio runtime")?;
    rt.block_on(collaborators.upload(&working_dir))
}
