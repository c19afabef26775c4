use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use semver::{Version, VersionReq};
use serde::Deserialize;

use crate::util::process::{self, CommandSpec, StdioMode};

// Abbreviated metadata keeps responses small; the full document is only
// requested when a caller explicitly asks for it.
const ABBREVIATED_ACCEPT: &str =
    "application/vnd.npm.install-v1+json;q=1.0, application/json;q=0.9, */*;q=0.8";

/// Known package managers, probed in priority order.
const PACKAGE_MANAGERS: &[&str] = &["yarn", "pnpm", "npm"];

#[derive(Debug)]
pub enum RegistryError {
    NoPackageManager,
    Command { manager: String, message: String },
    InvalidRange { range: String, source: semver::Error },
    Http(reqwest::Error),
    Status { url: String, status: StatusCode },
    ErrorBody(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NoPackageManager => {
                write!(f, "no package manager found (looked for yarn, pnpm, npm)")
            }
            RegistryError::Command { manager, message } => {
                write!(f, "`{manager}` config lookup failed: {message}")
            }
            RegistryError::InvalidRange { range, source } => {
                write!(f, "invalid version range `{range}`: {source}")
            }
            RegistryError::Http(err) => write!(f, "http error: {err}"),
            RegistryError::Status { url, status } => {
                write!(f, "unexpected status {status} from {url}")
            }
            RegistryError::ErrorBody(message) => write!(f, "registry error: {message}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<reqwest::Error> for RegistryError {
    fn from(value: reqwest::Error) -> Self {
        RegistryError::Http(value)
    }
}

/// Registry package metadata, in either the abbreviated or the full shape.
/// Some registries publish `versions` as a mapping, others as a plain list.
#[derive(Debug, Deserialize)]
pub struct PackageMetadata {
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
    #[serde(default)]
    pub versions: Option<VersionsField>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum VersionsField {
    List(Vec<String>),
    Map(HashMap<String, serde_json::Value>),
}

impl PackageMetadata {
    fn version_candidates(&self) -> Vec<&str> {
        match &self.versions {
            Some(VersionsField::List(list)) => list.iter().map(String::as_str).collect(),
            Some(VersionsField::Map(map)) => map.keys().map(String::as_str).collect(),
            None => Vec::new(),
        }
    }
}

pub struct RegistryResolver {
    http: reqwest::Client,
    registry_override: Option<String>,
    rc_paths: Vec<PathBuf>,
}

impl RegistryResolver {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            registry_override: None,
            rc_paths: default_rc_paths(),
        })
    }

    /// Skip package-manager discovery and use this registry URL directly.
    pub fn with_registry(mut self, url: impl Into<String>) -> Self {
        self.registry_override = Some(url.into());
        self
    }

    /// Override the rc file candidates, highest precedence first.
    pub fn with_rc_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.rc_paths = paths;
        self
    }

    /// Resolve `range` for `package` against the registry's published
    /// versions. A distribution tag match short-circuits semver resolution;
    /// `None` means no published version satisfies the range.
    pub async fn resolve_version(
        &self,
        package: &str,
        range: &str,
    ) -> Result<Option<String>, RegistryError> {
        let metadata = self.metadata(package, false).await?;
        resolve_from_metadata(&metadata, range)
    }

    pub async fn metadata(
        &self,
        package: &str,
        full: bool,
    ) -> Result<PackageMetadata, RegistryError> {
        let scope = extract_scope(package);
        let registry = self.registry_url(scope).await?;
        let url = format!("{}/{package}", registry.trim_end_matches('/'));

        let mut request = self.http.get(&url);
        if !full {
            request = request.header(ACCEPT, ABBREVIATED_ACCEPT);
        }
        if let Some(token) = self.auth_token(&registry) {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status { url, status });
        }
        let metadata: PackageMetadata = response.json().await?;
        if let Some(message) = &metadata.error {
            return Err(RegistryError::ErrorBody(message.clone()));
        }
        Ok(metadata)
    }

    async fn registry_url(&self, scope: Option<&str>) -> Result<String, RegistryError> {
        if let Some(url) = &self.registry_override {
            return Ok(url.clone());
        }
        let manager = PACKAGE_MANAGERS
            .iter()
            .copied()
            .find(|bin| which::which(bin).is_ok())
            .ok_or(RegistryError::NoPackageManager)?;

        // A failed lookup falls back to the alternate key newer yarn releases
        // use in place of `registry`.
        match self.scoped_or_global_registry(manager, scope).await {
            Ok(registry) => Ok(registry),
            Err(_) => self.config_get(manager, "npmRegistryServer").await,
        }
    }

    async fn scoped_or_global_registry(
        &self,
        manager: &str,
        scope: Option<&str>,
    ) -> Result<String, RegistryError> {
        if let Some(scope) = scope {
            let scoped = self
                .config_get(manager, &format!("{scope}:registry"))
                .await?;
            if !scoped.is_empty() && scoped != "undefined" {
                return Ok(scoped);
            }
        }
        self.config_get(manager, "registry").await
    }

    async fn config_get(&self, manager: &str, key: &str) -> Result<String, RegistryError> {
        let spec = CommandSpec::new(manager)
            .arg("config")
            .arg("get")
            .arg(key)
            .stdio(StdioMode::Capture);
        let output = process::run(&spec)
            .await
            .map_err(|error| RegistryError::Command {
                manager: manager.to_string(),
                message: format!("{error:#}"),
            })?;
        if !output.status.success() {
            return Err(RegistryError::Command {
                manager: manager.to_string(),
                message: format!(
                    "`config get {key}` exited with code {}",
                    output.status.code().unwrap_or_default()
                ),
            });
        }
        let stdout = output.stdout.unwrap_or_default();
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    fn auth_token(&self, registry: &str) -> Option<String> {
        let merged = merge_rc_files(&self.rc_paths);
        let key = format!("{}:_authToken", normalize_registry(registry));
        merged.get(&key).cloned()
    }
}

/// Resolve a range against already-fetched metadata. A `versionRange` that is
/// exactly a published distribution tag returns that tag's version with no
/// semantic comparison at all.
pub fn resolve_from_metadata(
    metadata: &PackageMetadata,
    range: &str,
) -> Result<Option<String>, RegistryError> {
    if let Some(version) = metadata.dist_tags.get(range) {
        return Ok(Some(version.clone()));
    }
    let req = VersionReq::parse(range).map_err(|source| RegistryError::InvalidRange {
        range: range.to_string(),
        source,
    })?;
    let mut best: Option<Version> = None;
    for candidate in metadata.version_candidates() {
        let Ok(version) = Version::parse(candidate) else {
            continue;
        };
        if req.matches(&version) && best.as_ref().is_none_or(|b| version > *b) {
            best = Some(version);
        }
    }
    Ok(best.map(|v| v.to_string()))
}

/// The organization scope of a package name, including the leading marker
/// (`@org/pkg` -> `@org`). Names without the marker have no scope.
pub fn extract_scope(package: &str) -> Option<&str> {
    if !package.starts_with('@') {
        return None;
    }
    let slash = package.find('/')?;
    if slash <= 1 {
        return None;
    }
    Some(&package[..slash])
}

// Strip the protocol and guarantee exactly one trailing slash, producing the
// host form npm rc files key their credentials on.
fn normalize_registry(url: &str) -> String {
    let stripped = url
        .strip_prefix("https:")
        .or_else(|| url.strip_prefix("http:"))
        .unwrap_or(url);
    if stripped.ends_with('/') {
        stripped.to_string()
    } else {
        format!("{stripped}/")
    }
}

// Earlier paths take precedence: a key set by the current-directory rc is
// never overwritten by the home or system files.
fn merge_rc_files(paths: &[PathBuf]) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for path in paths {
        let Ok(raw) = fs::read_to_string(path) else {
            continue;
        };
        for (key, value) in parse_rc(&raw) {
            merged.entry(key).or_insert(value);
        }
    }
    merged
}

fn parse_rc(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn default_rc_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(".npmrc"));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".npmrc"));
    }
    if let Ok(prefix) = std::env::var("PREFIX") {
        paths.push(PathBuf::from(prefix).join("etc").join("npmrc"));
    }
    paths
}
