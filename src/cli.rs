use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lyra-dev")]
#[command(version)]
#[command(about = "Lyra mini-program developer tooling CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the interactive development session for the current project
    Dev(DevArgs),
    /// Generate a preview QR code for the current project
    Preview(PreviewArgs),
    /// Upload the current project to the developer console
    Upload(UploadArgs),
    /// Resolve a package version range against the package registry
    Resolve(ResolveArgs),
    /// Manage lyra-dev configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
pub struct DevArgs {
    /// Session command to dispatch immediately after startup (same tokens as
    /// typed interactively, e.g. `web` or `qrcode`)
    #[arg(value_name = "COMMAND")]
    pub subcommand: Option<String>,
    /// Serve this URL as the target H5 page instead of starting the project's
    /// own build server
    #[arg(long = "target-h5-url")]
    pub target_h5_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Generate an on-device debugging QR code instead of a plain preview
    #[arg(long = "debug")]
    pub debug: bool,
}

#[derive(Args, Debug)]
pub struct UploadArgs {}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Package name (scoped names like @lyra/cli-templates are supported)
    pub package: String,
    /// Version range or distribution tag to resolve
    #[arg(default_value = "latest")]
    pub range: String,
    /// Registry base URL override (otherwise resolved via the package manager)
    #[arg(long = "registry")]
    pub registry: Option<String>,
    /// Request the full metadata document instead of the abbreviated one
    #[arg(long = "full")]
    pub full: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Set a key in lyra-dev config (e.g. web.assets_port)
    Set(ConfigSetArgs),
}

#[derive(Args, Debug)]
pub struct ConfigSetArgs {
    /// Config key path (e.g. web.assets_port)
    pub key: String,
    /// Value to assign to the key (stored as a string)
    pub value: String,
    /// Override config file path (default: $XDG_CONFIG_HOME/lyra-dev/config.toml)
    #[arg(long = "file")]
    pub file: Option<PathBuf>,
}
