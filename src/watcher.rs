use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::actions::DiagnosticsSink;
use crate::project;
use crate::util::json;

/// Derived file rewritten after every applied reload so an external IDE/build
/// watcher picks the change up and recompiles.
pub struct MirrorFile {
    pub path: PathBuf,
    pub content: String,
}

/// Polls watched files for modification and reloads them. A reload either
/// applies a full valid parse or leaves the previous value untouched; there
/// is no partial application.
pub struct ConfigWatcher {
    poll_interval: Duration,
    quiet_period: Duration,
    mirror: Option<Arc<MirrorFile>>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    tasks: Vec<JoinHandle<()>>,
}

// Per-path reload cycle: Idle -> Changed -> Reloading -> (Applied | Failed) -> Idle.
// Reloading/Applied/Failed are transient within one tick, so only the durable
// states are carried across ticks.
enum WatchState {
    Idle,
    Changed {
        candidate: Option<SystemTime>,
        since: Instant,
    },
}

impl ConfigWatcher {
    pub fn new(diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self::with_intervals(
            diagnostics,
            Duration::from_millis(200),
            Duration::from_millis(300),
        )
    }

    pub fn with_intervals(
        diagnostics: Arc<dyn DiagnosticsSink>,
        poll_interval: Duration,
        quiet_period: Duration,
    ) -> Self {
        Self {
            poll_interval,
            quiet_period,
            mirror: None,
            diagnostics,
            tasks: Vec::new(),
        }
    }

    pub fn set_mirror(&mut self, mirror: MirrorFile) {
        self.mirror = Some(Arc::new(mirror));
    }

    /// Begin monitoring `paths`. Rapid successive writes to one path collapse
    /// into a single reload (last write wins); distinct paths reload
    /// independently of each other.
    pub fn watch<F>(&mut self, paths: Vec<PathBuf>, on_change: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let on_change = Arc::new(on_change);
        for path in paths {
            let task = tokio::spawn(watch_path(
                path,
                self.poll_interval,
                self.quiet_period,
                self.mirror.clone(),
                on_change.clone(),
                self.diagnostics.clone(),
            ));
            self.tasks.push(task);
        }
    }

    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn watch_path<F>(
    path: PathBuf,
    poll_interval: Duration,
    quiet_period: Duration,
    mirror: Option<Arc<MirrorFile>>,
    on_change: Arc<F>,
    diagnostics: Arc<dyn DiagnosticsSink>,
) where
    F: Fn(Value) + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_applied = modified_at(&path);
    let mut state = WatchState::Idle;

    loop {
        interval.tick().await;
        let seen = modified_at(&path);
        state = match state {
            WatchState::Idle => {
                if seen == last_applied {
                    WatchState::Idle
                } else {
                    WatchState::Changed {
                        candidate: seen,
                        since: Instant::now(),
                    }
                }
            }
            WatchState::Changed { candidate, since } => {
                if seen != candidate {
                    // Another write landed; restart the quiet period on the
                    // newest contents.
                    WatchState::Changed {
                        candidate: seen,
                        since: Instant::now(),
                    }
                } else if since.elapsed() >= quiet_period {
                    match reload(&path, mirror.as_deref(), on_change.as_ref()) {
                        Ok(()) => tracing::debug!("reload applied for {}", path.display()),
                        Err(error) => {
                            diagnostics.report(&format!("reload of {}", path.display()), &error);
                        }
                    }
                    last_applied = seen;
                    WatchState::Idle
                } else {
                    WatchState::Changed { candidate, since }
                }
            }
        };
    }
}

fn reload<F>(path: &Path, mirror: Option<&MirrorFile>, on_change: &F) -> Result<()>
where
    F: Fn(Value),
{
    let value = json::read_json_file(path)?;
    if !project::is_reloadable(&value) {
        bail!("{} parsed to an empty document", path.display());
    }
    on_change(value);
    if let Some(mirror) = mirror {
        fs::write(&mirror.path, &mirror.content)
            .with_context(|| format!("failed to rewrite {}", mirror.path.display()))?;
    }
    Ok(())
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
