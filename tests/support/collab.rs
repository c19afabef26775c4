use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use lyra_dev::actions::{Collaborators, DiagnosticsSink};

/// Collaborators stub that records every invocation instead of delegating to
/// the companion toolchain.
#[derive(Default)]
pub struct MemoryCollaborators {
    pub calls: Mutex<Vec<String>>,
    pub confirm_answer: bool,
}

impl MemoryCollaborators {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            confirm_answer: true,
        })
    }

    pub fn recorded(&self) -> Vec<String> {
        self.calls.lock().expect("mutex poisoned").clone()
    }

    fn record(&self, entry: impl Into<String>) {
        self.calls.lock().expect("mutex poisoned").push(entry.into());
    }
}

#[async_trait]
impl Collaborators for MemoryCollaborators {
    async fn preview_qrcode(&self, _project_dir: &Path, debug: bool) -> Result<()> {
        self.record(format!("qrcode debug={debug}"));
        Ok(())
    }

    async fn upload(&self, _project_dir: &Path) -> Result<()> {
        self.record("upload");
        Ok(())
    }

    async fn lint(&self, _project_dir: &Path) -> Result<()> {
        self.record("lint");
        Ok(())
    }

    async fn launch_ide(&self, _project_dir: &Path, ide_bin: Option<&Path>) -> Result<()> {
        self.record(format!("ide bin={}", ide_bin.is_some()));
        Ok(())
    }

    async fn create_plugin_component(&self, _project_dir: &Path, name: &str) -> Result<()> {
        self.record(format!("component {name}"));
        Ok(())
    }

    async fn bundle_plugin_h5(&self, _project_dir: &Path) -> Result<()> {
        self.record("h5-bundle");
        Ok(())
    }

    async fn pc_preview(&self, _project_dir: &Path) -> Result<()> {
        self.record("pc-preview");
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<()> {
        self.record(format!("open {url}"));
        Ok(())
    }

    async fn confirm(&self, _prompt: &str) -> Result<bool> {
        self.record("confirm");
        Ok(self.confirm_answer)
    }
}

/// Diagnostics sink that keeps every report for later assertions.
#[derive(Default)]
pub struct CollectDiagnostics {
    pub reports: Mutex<Vec<String>>,
}

impl CollectDiagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn recorded(&self) -> Vec<String> {
        self.reports.lock().expect("mutex poisoned").clone()
    }
}

impl DiagnosticsSink for CollectDiagnostics {
    fn report(&self, context: &str, error: &anyhow::Error) {
        self.reports
            .lock()
            .expect("mutex poisoned")
            .push(format!("{context}: {error:#}"));
    }
}
