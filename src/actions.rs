use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::LyraDevConfig;
use crate::util::process::{self, CommandSpec, StdioMode};

const TOOL_NAME: &str = "lyra-tools";

/// Sink for errors that escape command handlers and background callbacks.
/// Nothing behind this boundary may crash the session.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, context: &str, error: &anyhow::Error);
}

pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn report(&self, context: &str, error: &anyhow::Error) {
        tracing::error!("{context}: {error:#}");
    }
}

/// The opaque operations the session orchestrator hands off to the wider
/// toolchain. Everything here is fire-and-report: the session only cares
/// about success or failure.
#[async_trait]
pub trait Collaborators: Send + Sync {
    async fn preview_qrcode(&self, project_dir: &Path, debug: bool) -> Result<()>;
    async fn upload(&self, project_dir: &Path) -> Result<()>;
    async fn lint(&self, project_dir: &Path) -> Result<()>;
    async fn launch_ide(&self, project_dir: &Path, ide_bin: Option<&Path>) -> Result<()>;
    async fn create_plugin_component(&self, project_dir: &Path, name: &str) -> Result<()>;
    async fn bundle_plugin_h5(&self, project_dir: &Path) -> Result<()>;
    async fn pc_preview(&self, project_dir: &Path) -> Result<()>;
    async fn open_url(&self, url: &str) -> Result<()>;
    async fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Production collaborators: delegate every action to the `lyra-tools`
/// companion binary, resolved per call so a session can start on a machine
/// where the toolchain is only partially installed.
pub struct DelegateCollaborators {
    configured_path: Option<PathBuf>,
}

impl DelegateCollaborators {
    pub fn from_config(config: &LyraDevConfig) -> Self {
        Self {
            configured_path: config.tools.lyra_tools.path.clone(),
        }
    }

    fn tool_program(&self) -> Result<PathBuf> {
        resolve_tool(self.configured_path.as_deref())
    }

    async fn run_tool(&self, project_dir: &Path, args: &[&str]) -> Result<()> {
        let program = self.tool_program()?;
        let mut spec = CommandSpec::new(program.as_os_str());
        spec.args = args.iter().map(OsString::from).collect();
        spec.current_dir = Some(project_dir.to_path_buf());
        spec.stdio = StdioMode::Inherit;
        let output = process::run(&spec).await?;
        if !output.status.success() {
            let code = output.status.code().unwrap_or_default();
            bail!(
                "`{} {}` failed with exit code {code}",
                program.display(),
                args.join(" ")
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Collaborators for DelegateCollaborators {
    async fn preview_qrcode(&self, project_dir: &Path, debug: bool) -> Result<()> {
        if debug {
            self.run_tool(project_dir, &["qrcode", "--debug"]).await
        } else {
            self.run_tool(project_dir, &["qrcode"]).await
        }
    }

    async fn upload(&self, project_dir: &Path) -> Result<()> {
        self.run_tool(project_dir, &["upload"]).await
    }

    async fn lint(&self, project_dir: &Path) -> Result<()> {
        self.run_tool(project_dir, &["lint"]).await
    }

    async fn launch_ide(&self, project_dir: &Path, ide_bin: Option<&Path>) -> Result<()> {
        match ide_bin {
            Some(path) => {
                let arg = path.to_str().context("ide path is not valid UTF-8")?;
                self.run_tool(project_dir, &["ide", "--bin", arg]).await
            }
            None => self.run_tool(project_dir, &["ide"]).await,
        }
    }

    async fn create_plugin_component(&self, project_dir: &Path, name: &str) -> Result<()> {
        self.run_tool(project_dir, &["component", "new", name]).await
    }

    async fn bundle_plugin_h5(&self, project_dir: &Path) -> Result<()> {
        self.run_tool(project_dir, &["h5-bundle"]).await
    }

    async fn pc_preview(&self, project_dir: &Path) -> Result<()> {
        self.run_tool(project_dir, &["pc-preview"]).await
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        let mut spec = CommandSpec::new(URL_OPENER[0]);
        spec.args = URL_OPENER[1..].iter().map(OsString::from).collect();
        spec.args.push(OsString::from(url));
        spec.stdio = StdioMode::Ignore;
        let output = process::run(&spec).await?;
        if !output.status.success() {
            bail!("failed to open {url} in a browser");
        }
        Ok(())
    }

    async fn confirm(&self, prompt: &str) -> Result<bool> {
        println!("{prompt} (y/N)");
        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        reader
            .read_line(&mut line)
            .await
            .context("failed to read confirmation from stdin")?;
        let answer = line.trim().to_ascii_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

#[cfg(target_os = "macos")]
const URL_OPENER: &[&str] = &["open"];
#[cfg(target_os = "windows")]
const URL_OPENER: &[&str] = &["cmd", "/C", "start"];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const URL_OPENER: &[&str] = &["xdg-open"];

/// Resolve the companion binary by env override, configured path, then PATH.
pub fn resolve_tool(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(raw) = std::env::var_os("LYRA_DEV_BIN_LYRA_TOOLS") {
        let path = PathBuf::from(raw);
        if !path.exists() {
            bail!(
                "LYRA_DEV_BIN_LYRA_TOOLS points to `{}` but it does not exist",
                path.display()
            );
        }
        return Ok(path);
    }

    if let Some(custom) = configured {
        if !custom.exists() {
            bail!(
                "configured lyra-tools path `{}` does not exist",
                custom.display()
            );
        }
        return Ok(custom.to_path_buf());
    }

    which::which(TOOL_NAME).with_context(|| {
        format!(
            "{TOOL_NAME} is required but was not found; install it, set \
             LYRA_DEV_BIN_LYRA_TOOLS, or set [tools.lyra-tools].path in config"
        )
    })
}
