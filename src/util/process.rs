use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};

/// How a spawned child's stdout/stderr are wired up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StdioMode {
    Inherit,
    Ignore,
    Capture,
}

/// Launch parameters for a child process, independent of host OS shell quirks.
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub env: Vec<(OsString, OsString)>,
    pub current_dir: Option<PathBuf>,
    pub stdio: StdioMode,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
            stdio: StdioMode::Inherit,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn stdio(mut self, mode: StdioMode) -> Self {
        self.stdio = mode;
        self
    }
}

pub struct CommandOutput {
    pub status: std::process::ExitStatus,
    pub stdout: Option<Vec<u8>>,
    pub stderr: Option<Vec<u8>>,
}

fn build_command(spec: &CommandSpec) -> Command {
    let mut command = Command::new(&spec.program);
    command.args(&spec.args);
    if let Some(dir) = &spec.current_dir {
        command.current_dir(dir);
    }
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    match spec.stdio {
        StdioMode::Inherit => {
            command.stdout(Stdio::inherit());
            command.stderr(Stdio::inherit());
        }
        StdioMode::Ignore => {
            command.stdout(Stdio::null());
            command.stderr(Stdio::null());
        }
        StdioMode::Capture => {
            command.stdout(Stdio::piped());
            command.stderr(Stdio::piped());
        }
    }
    command
}

/// Spawn a long-lived child. The child is killed when its handle is dropped,
/// tying subprocess lifetimes to the session process.
pub fn spawn(spec: &CommandSpec) -> Result<Child> {
    let mut command = build_command(spec);
    command.kill_on_drop(true);
    command
        .spawn()
        .with_context(|| format!("failed to spawn `{}`", spec.program.to_string_lossy()))
}

/// Run a child to completion. Output is captured only in `Capture` mode;
/// otherwise the child talks to the session's terminal directly.
pub async fn run(spec: &CommandSpec) -> Result<CommandOutput> {
    let mut command = build_command(spec);
    match spec.stdio {
        StdioMode::Inherit | StdioMode::Ignore => {
            let status = command
                .status()
                .await
                .with_context(|| format!("failed to spawn `{}`", spec.program.to_string_lossy()))?;
            Ok(CommandOutput {
                status,
                stdout: None,
                stderr: None,
            })
        }
        StdioMode::Capture => {
            let output = command
                .output()
                .await
                .with_context(|| format!("failed to spawn `{}`", spec.program.to_string_lossy()))?;
            Ok(CommandOutput {
                status: output.status,
                stdout: Some(output.stdout),
                stderr: Some(output.stderr),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let spec = CommandSpec::new("echo").arg("hello").stdio(StdioMode::Capture);
        let output = run(&spec).await.unwrap();
        assert!(output.status.success());
        let stdout = output.stdout.expect("capture mode returns stdout");
        assert_eq!(String::from_utf8_lossy(&stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn missing_binary_is_an_error() {
        let spec = CommandSpec::new("lyra-dev-no-such-binary");
        assert!(run(&spec).await.is_err());
    }
}
