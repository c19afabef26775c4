use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::actions::{Collaborators, DelegateCollaborators, DiagnosticsSink, TracingDiagnostics};
use crate::command_bus::CommandBus;
use crate::commands;
use crate::config::{self, LyraDevConfig};
use crate::project::{self, PROJECT_RC_NAME, ProjectConfig, ProjectMode};
use crate::services::ServiceHandle;
use crate::watcher::{ConfigWatcher, MirrorFile};

pub struct SessionOptions {
    /// Command to dispatch through the bus right after startup.
    pub subcommand: Option<String>,
    pub target_h5_url: Option<String>,
}

/// Live state of one development session. Created once at startup; the
/// project config is the only piece that changes afterwards, replaced
/// wholesale by the watcher's reload path.
pub struct SessionContext {
    pub working_dir: PathBuf,
    pub config_path: PathBuf,
    config: RwLock<ProjectConfig>,
    pub tool_config: LyraDevConfig,
    pub bus: CommandBus,
    pub collaborators: Arc<dyn Collaborators>,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
    pub target_h5_url: Option<String>,
    pub services: tokio::sync::Mutex<Vec<ServiceHandle>>,
}

impl SessionContext {
    pub fn config(&self) -> ProjectConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mode(&self) -> Option<ProjectMode> {
        self.config().mode()
    }

    fn replace_config(&self, updated: ProjectConfig) {
        *self
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = updated;
    }
}

/// The interactive dev session: derive the project mode, register the
/// matching command set, watch the workspace rc, then serve stdin commands
/// until EOF.
pub async fn run(options: SessionOptions) -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let working_dir = std::env::current_dir().context("failed to resolve working directory")?;
    let tool_config = config::load()?;
    let config_path = project::rc_path(&working_dir);

    let project_config = project::load(&working_dir).unwrap_or_default();
    if project_config.mode().is_none() {
        eprintln!(
            "No {PROJECT_RC_NAME} with a supported project type found under {}. \
             Scaffold a project first, or add the file by hand with at least a \
             `type` field (miniProgram, plugin or h5).",
            working_dir.display()
        );
        return Ok(());
    }

    let diagnostics: Arc<dyn DiagnosticsSink> = Arc::new(TracingDiagnostics);
    let collaborators: Arc<dyn Collaborators> =
        Arc::new(DelegateCollaborators::from_config(&tool_config));
    let bus = CommandBus::new(diagnostics.clone());

    let mirror_path = project::mirror_path(&working_dir);
    let mirror_content =
        std::fs::read_to_string(&mirror_path).unwrap_or_else(|_| "{}\n".to_string());

    let ctx = Arc::new(SessionContext {
        working_dir,
        config_path: config_path.clone(),
        config: RwLock::new(project_config),
        tool_config,
        bus,
        collaborators,
        diagnostics: diagnostics.clone(),
        target_h5_url: options.target_h5_url,
        services: tokio::sync::Mutex::new(Vec::new()),
    });

    commands::register_for_mode(&ctx);

    let mut watcher = ConfigWatcher::new(diagnostics);
    watcher.set_mirror(MirrorFile {
        path: mirror_path,
        content: mirror_content,
    });
    {
        let ctx = ctx.clone();
        watcher.watch(vec![config_path], move |value| apply_reload(&ctx, value));
    }

    match &options.subcommand {
        Some(name) if ctx.bus.is_subscribed(name) => {
            let _ = ctx.bus.publish(name, Vec::new());
        }
        Some(_) | None => print_tips(&ctx.bus),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("failed to read from stdin")?
    {
        let mut tokens = line.split_whitespace().map(str::to_string);
        let Some(name) = tokens.next() else {
            continue;
        };
        let args: Vec<String> = tokens.collect();
        if ctx.bus.publish(&name, args).is_unknown() {
            println!("Unknown command `{name}`. These are available:");
            print_tips(&ctx.bus);
        }
    }

    teardown(&ctx, watcher).await;
    Ok(())
}

/// Applied by the watcher once a reload parsed to a non-empty document. The
/// config is swapped in full and the command set is re-derived for the new
/// mode.
fn apply_reload(ctx: &Arc<SessionContext>, value: Value) {
    match project::parse(&value) {
        Ok(updated) => {
            let has_mode = updated.mode().is_some();
            ctx.replace_config(updated);
            println!("Configuration updated");
            if has_mode {
                commands::register_for_mode(ctx);
                print_tips(&ctx.bus);
            } else {
                tracing::warn!(
                    "reloaded configuration has no supported project type; \
                     keeping the current command set"
                );
            }
        }
        Err(error) => ctx.diagnostics.report("applying reloaded configuration", &error),
    }
}

pub fn print_tips(bus: &CommandBus) {
    let descriptions = bus.descriptions();
    if descriptions.is_empty() {
        return;
    }
    println!("Available commands:");
    for entry in descriptions {
        println!("  {:<24} {}", entry.name, entry.description);
    }
}

async fn teardown(ctx: &Arc<SessionContext>, mut watcher: ConfigWatcher) {
    watcher.shutdown();
    let mut services = ctx.services.lock().await;
    for handle in services.iter_mut() {
        handle.shutdown().await;
    }
    services.clear();
}
