use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct LyraDevConfig {
    #[serde(default)]
    pub web: WebSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// Preferred ports and asset locations for the web simulator stack. Every
/// port here is a starting point for negotiation, never a guarantee.
#[derive(Debug, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_target_h5_port")]
    pub target_h5_port: u16,
    #[serde(default = "default_assets_port")]
    pub assets_port: u16,
    #[serde(default = "default_framework_port")]
    pub framework_port: u16,
    #[serde(default = "default_proxy_server_port")]
    pub proxy_server_port: u16,
    /// Override for the simulator assets directory (default: <project>/.lyra/simulator-assets).
    #[serde(default)]
    pub assets_dir: Option<PathBuf>,
    /// Override for the simulator framework shell directory (default: <project>/.lyra/web-simulator).
    #[serde(default)]
    pub framework_dir: Option<PathBuf>,
    /// Override for the proxy server script (default: <project>/.lyra/simulator-proxy.js).
    #[serde(default)]
    pub proxy_script: Option<PathBuf>,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            target_h5_port: default_target_h5_port(),
            assets_port: default_assets_port(),
            framework_port: default_framework_port(),
            proxy_server_port: default_proxy_server_port(),
            assets_dir: None,
            framework_dir: None,
            proxy_script: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolsSection {
    #[serde(rename = "lyra-tools", default)]
    pub lyra_tools: ToolEntry,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolEntry {
    pub path: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_target_h5_port() -> u16 {
    3000
}

fn default_assets_port() -> u16 {
    8001
}

fn default_framework_port() -> u16 {
    8000
}

fn default_proxy_server_port() -> u16 {
    8002
}

pub fn load() -> Result<LyraDevConfig> {
    let path_override = std::env::var("LYRA_DEV_CONFIG").ok();
    load_from(path_override.as_deref())
}

pub fn load_from(path_override: Option<&str>) -> Result<LyraDevConfig> {
    let Some(path) = config_path_override(path_override) else {
        return Ok(LyraDevConfig::default());
    };

    if !path.exists() {
        return Ok(LyraDevConfig::default());
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config: LyraDevConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    Ok(config)
}

fn config_path_override(path_override: Option<&str>) -> Option<PathBuf> {
    if let Some(raw) = path_override {
        return Some(PathBuf::from(raw));
    }
    config_path()
}

pub fn config_path() -> Option<PathBuf> {
    // Prefer XDG-style config path, but fall back to legacy ~/.lyra/config.toml.
    if let Some(mut dir) = dirs::config_dir() {
        dir.push("lyra-dev");
        dir.push("config.toml");
        if dir.exists() {
            return Some(dir);
        }
    }
    dirs::home_dir().map(|mut home| {
        home.push(".lyra");
        home.push("config.toml");
        home
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let config = load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.web.framework_port, 8000);
        assert!(config.tools.lyra_tools.path.is_none());
    }

    #[test]
    fn partial_web_section_keeps_other_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[web]\nassets_port = 9100\nhost = \"127.0.0.1\"").unwrap();

        let config = load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.web.assets_port, 9100);
        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.web.proxy_server_port, 8002);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[web\nassets_port = nope").unwrap();
        assert!(load_from(Some(path.to_str().unwrap())).is_err());
    }
}
