use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;

pub fn read_json_file(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(raw.trim())
        .with_context(|| format!("failed to parse {}", path.display()))
}

/// Read a JSON file that may legitimately be absent or broken; `None` in both
/// cases, matching the forgiving read used for workspace rc files.
pub fn read_json_opt(path: &Path) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    match read_json_file(path) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::error!("get rc fail: {error:#}");
            None
        }
    }
}

pub fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON")?;
    fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))
}
