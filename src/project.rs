use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::util::json;

/// Workspace rc file that defines the project; a session cannot start
/// without it.
pub const PROJECT_RC_NAME: &str = "lyra.config.json";

/// Derived config mirror watched by the IDE toolchain. Rewriting it after a
/// reload is what makes the external watcher recompile.
pub const MIRROR_FILE_NAME: &str = "mini.project.json";

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ProjectConfig {
    #[serde(rename = "type", default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub typescript: bool,
    #[serde(default)]
    pub base: String,
    #[serde(rename = "outDir", default)]
    pub out_dir: String,
    #[serde(rename = "isPcPlugin", default)]
    pub is_pc_plugin: bool,
    #[serde(rename = "miniAppId", default)]
    pub mini_app_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectMode {
    MiniProgram,
    Plugin,
    PcPlugin,
    H5,
}

impl fmt::Display for ProjectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProjectMode::MiniProgram => "miniProgram",
            ProjectMode::Plugin => "plugin",
            ProjectMode::PcPlugin => "pcPlugin",
            ProjectMode::H5 => "h5",
        };
        f.write_str(label)
    }
}

impl ProjectConfig {
    /// Derive the session mode. `None` when the type field is missing or not
    /// one of the supported project kinds.
    pub fn mode(&self) -> Option<ProjectMode> {
        match self.project_type.as_deref() {
            Some("miniProgram") => Some(ProjectMode::MiniProgram),
            Some("plugin") if self.is_pc_plugin => Some(ProjectMode::PcPlugin),
            Some("plugin") => Some(ProjectMode::Plugin),
            Some("h5") => Some(ProjectMode::H5),
            _ => None,
        }
    }
}

pub fn rc_path(project_dir: &Path) -> PathBuf {
    project_dir.join(PROJECT_RC_NAME)
}

pub fn mirror_path(project_dir: &Path) -> PathBuf {
    project_dir.join(MIRROR_FILE_NAME)
}

/// Load the workspace rc. `None` when the file does not exist or cannot be
/// parsed; the caller decides whether that is fatal.
pub fn load(project_dir: &Path) -> Option<ProjectConfig> {
    let raw = json::read_json_opt(&rc_path(project_dir))?;
    parse(&raw).ok()
}

/// A reload is only applied when the document is a non-empty JSON object.
pub fn is_reloadable(value: &Value) -> bool {
    value.as_object().is_some_and(|map| !map.is_empty())
}

pub fn parse(value: &Value) -> Result<ProjectConfig> {
    serde_json::from_value(value.clone()).context("workspace rc has an unexpected shape")
}

/// Patch a single top-level key in the rc file, preserving every other field
/// verbatim (the rc may carry keys this tool does not model).
pub fn set_item(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut doc = if path.exists() {
        json::read_json_file(path)?
    } else {
        Value::Object(serde_json::Map::new())
    };
    let map = doc
        .as_object_mut()
        .with_context(|| format!("{} is not a JSON object", path.display()))?;
    map.insert(key.to_string(), Value::String(value.to_string()));
    json::write_json_pretty(path, &doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mode_derivation() {
        let mut config = ProjectConfig {
            project_type: Some("miniProgram".into()),
            ..ProjectConfig::default()
        };
        assert_eq!(config.mode(), Some(ProjectMode::MiniProgram));

        config.project_type = Some("plugin".into());
        assert_eq!(config.mode(), Some(ProjectMode::Plugin));

        config.is_pc_plugin = true;
        assert_eq!(config.mode(), Some(ProjectMode::PcPlugin));

        config.project_type = Some("h5".into());
        assert_eq!(config.mode(), Some(ProjectMode::H5));

        config.project_type = Some("desktop".into());
        assert_eq!(config.mode(), None);
        config.project_type = None;
        assert_eq!(config.mode(), None);
    }

    #[test]
    fn reloadable_requires_nonempty_object() {
        assert!(is_reloadable(&json!({"type": "h5"})));
        assert!(!is_reloadable(&json!({})));
        assert!(!is_reloadable(&json!(null)));
        assert!(!is_reloadable(&json!([1, 2])));
    }

    #[test]
    fn set_item_preserves_unknown_fields() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(PROJECT_RC_NAME);
        std::fs::write(
            &path,
            r#"{"type": "miniProgram", "customField": {"nested": true}}"#,
        )
        .unwrap();

        set_item(&path, "miniAppId", "5000001234").unwrap();

        let value = json::read_json_file(&path).unwrap();
        assert_eq!(value["miniAppId"], "5000001234");
        assert_eq!(value["customField"]["nested"], true);
        assert_eq!(value["type"], "miniProgram");
    }

    #[test]
    fn set_item_creates_missing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(PROJECT_RC_NAME);
        set_item(&path, "type", "plugin").unwrap();
        let value = json::read_json_file(&path).unwrap();
        assert_eq!(value["type"], "plugin");
    }
}
