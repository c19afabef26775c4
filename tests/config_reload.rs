mod support;

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lyra_dev::watcher::{ConfigWatcher, MirrorFile};
use serde_json::Value;
use support::CollectDiagnostics;
use tempfile::TempDir;

const POLL: Duration = Duration::from_millis(25);
const QUIET: Duration = Duration::from_millis(60);
// Long enough for poll + quiet period + reload to complete on a busy runner.
const SETTLE: Duration = Duration::from_millis(600);

fn watcher_with(
    diagnostics: Arc<CollectDiagnostics>,
) -> (ConfigWatcher, Arc<Mutex<Vec<Value>>>) {
    let watcher = ConfigWatcher::with_intervals(diagnostics, POLL, QUIET);
    (watcher, Arc::new(Mutex::new(Vec::new())))
}

fn record_into(seen: &Arc<Mutex<Vec<Value>>>) -> impl Fn(Value) + Send + Sync + 'static {
    let seen = seen.clone();
    move |value| seen.lock().expect("mutex poisoned").push(value)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn valid_reload_delivers_the_new_value_and_rewrites_the_mirror() {
    let temp = TempDir::new().unwrap();
    let rc = temp.path().join("lyra.config.json");
    let mirror = temp.path().join("mini.project.json");
    fs::write(&rc, r#"{"type": "miniProgram"}"#).unwrap();

    let diagnostics = CollectDiagnostics::new();
    let (mut watcher, seen) = watcher_with(diagnostics.clone());
    watcher.set_mirror(MirrorFile {
        path: mirror.clone(),
        content: "{\"mirror\": true}\n".to_string(),
    });
    watcher.watch(vec![rc.clone()], record_into(&seen));

    tokio::time::sleep(SETTLE).await;
    assert!(seen.lock().unwrap().is_empty(), "no change yet");

    fs::write(&rc, r#"{"type": "plugin", "isPcPlugin": true}"#).unwrap();
    tokio::time::sleep(SETTLE).await;

    let values = seen.lock().unwrap().clone();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["type"], "plugin");
    assert_eq!(values[0]["isPcPlugin"], true);

    let mirrored = fs::read_to_string(&mirror).unwrap();
    assert_eq!(mirrored, "{\"mirror\": true}\n");
    assert!(diagnostics.recorded().is_empty());

    watcher.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unparseable_reload_is_reported_and_not_delivered() {
    let temp = TempDir::new().unwrap();
    let rc = temp.path().join("lyra.config.json");
    fs::write(&rc, r#"{"type": "h5"}"#).unwrap();

    let diagnostics = CollectDiagnostics::new();
    let (mut watcher, seen) = watcher_with(diagnostics.clone());
    watcher.watch(vec![rc.clone()], record_into(&seen));
    tokio::time::sleep(SETTLE).await;

    fs::write(&rc, "{not json at all").unwrap();
    tokio::time::sleep(SETTLE).await;

    assert!(seen.lock().unwrap().is_empty());
    let reports = diagnostics.recorded();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("lyra.config.json"));

    watcher.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_document_counts_as_a_failed_reload() {
    let temp = TempDir::new().unwrap();
    let rc = temp.path().join("lyra.config.json");
    fs::write(&rc, r#"{"type": "h5"}"#).unwrap();

    let diagnostics = CollectDiagnostics::new();
    let (mut watcher, seen) = watcher_with(diagnostics.clone());
    watcher.watch(vec![rc.clone()], record_into(&seen));
    tokio::time::sleep(SETTLE).await;

    fs::write(&rc, "{}").unwrap();
    tokio::time::sleep(SETTLE).await;

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(diagnostics.recorded().len(), 1);

    watcher.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rapid_writes_collapse_to_one_reload_with_the_last_value() {
    let temp = TempDir::new().unwrap();
    let rc = temp.path().join("lyra.config.json");
    fs::write(&rc, r#"{"type": "miniProgram"}"#).unwrap();

    let diagnostics = CollectDiagnostics::new();
    let (mut watcher, seen) = watcher_with(diagnostics.clone());
    watcher.watch(vec![rc.clone()], record_into(&seen));
    tokio::time::sleep(SETTLE).await;

    // Burst of writes well inside one quiet period.
    fs::write(&rc, r#"{"type": "miniProgram", "rev": 1}"#).unwrap();
    fs::write(&rc, r#"{"type": "miniProgram", "rev": 2}"#).unwrap();
    fs::write(&rc, r#"{"type": "miniProgram", "rev": 3}"#).unwrap();
    tokio::time::sleep(SETTLE).await;

    let values = seen.lock().unwrap().clone();
    assert_eq!(values.len(), 1, "rapid writes must collapse");
    assert_eq!(values[0]["rev"], 3, "last write wins");

    watcher.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watched_paths_reload_independently() {
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("lyra.config.json");
    let second = temp.path().join("other.config.json");
    fs::write(&first, r#"{"type": "h5"}"#).unwrap();
    fs::write(&second, r#"{"type": "plugin"}"#).unwrap();

    let diagnostics = CollectDiagnostics::new();
    let (mut watcher, seen) = watcher_with(diagnostics);
    watcher.watch(vec![first.clone(), second.clone()], record_into(&seen));
    tokio::time::sleep(SETTLE).await;

    // Breaking one file must not stop the other from reloading.
    fs::write(&first, "broken{").unwrap();
    fs::write(&second, r#"{"type": "plugin", "rev": 2}"#).unwrap();
    tokio::time::sleep(SETTLE).await;

    let values = seen.lock().unwrap().clone();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0]["rev"], 2);

    watcher.shutdown();
}
