use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use axum::Router;
use axum::http::{HeaderValue, header};
use tokio::net::TcpListener;
use tokio::process::Child;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::actions::{Collaborators, DiagnosticsSink};
use crate::config::WebSection;
use crate::ports::PortNegotiator;
use crate::util::process::{self, CommandSpec, StdioMode};

pub const TARGET_H5: &str = "target-h5";
pub const SIMULATOR_ASSETS: &str = "simulator-assets";
pub const SIMULATOR_FRAMEWORK: &str = "simulator-framework";
pub const PROXY_SERVER: &str = "proxy-server";

pub enum ServiceKind {
    StaticDir { root: PathBuf },
    Subprocess { spec: CommandSpec },
}

pub struct ServiceSpec {
    pub name: String,
    pub host: String,
    pub preferred_port: u16,
    pub kind: ServiceKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceStatus {
    Starting,
    Running,
    Failed(String),
}

pub struct ServiceHandle {
    pub name: String,
    pub host: String,
    pub bound_port: Option<u16>,
    pub status: ServiceStatus,
    process: Option<Child>,
    server: Option<JoinHandle<()>>,
}

impl ServiceHandle {
    fn failed(name: String, host: String, bound_port: Option<u16>, reason: String) -> Self {
        Self {
            name,
            host,
            bound_port,
            status: ServiceStatus::Failed(reason),
            process: None,
            server: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == ServiceStatus::Running
    }

    /// Base URL of the service, available once it is running.
    pub fn url(&self) -> Option<String> {
        match (&self.status, self.bound_port) {
            (ServiceStatus::Running, Some(port)) => Some(format!("http://{}:{port}", self.host)),
            _ => None,
        }
    }

    /// Stop the service: kill the subprocess or close the listener task.
    pub async fn shutdown(&mut self) {
        if let Some(mut child) = self.process.take() {
            let _ = child.kill().await;
        }
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

enum Pending {
    Starting {
        name: String,
        host: String,
        port: u16,
        start: JoinHandle<Result<Started>>,
    },
    Failed {
        name: String,
        host: String,
        reason: String,
    },
}

enum Started {
    Static(JoinHandle<()>),
    Process(Child),
}

/// Brings up a set of local services. Port negotiation is serialized across
/// specs so no two services pick the same port; the startups themselves run
/// concurrently and fail independently.
pub struct ServiceOrchestrator {
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl ServiceOrchestrator {
    pub fn new(diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        Self { diagnostics }
    }

    pub async fn bring_up(&self, specs: Vec<ServiceSpec>) -> Vec<ServiceHandle> {
        let mut negotiator = PortNegotiator::new();
        let mut pending = Vec::with_capacity(specs.len());

        for spec in specs {
            let ServiceSpec {
                name,
                host,
                preferred_port,
                kind,
            } = spec;
            let port = match negotiator.choose(&host, preferred_port).await {
                Ok(port) => port,
                Err(error) => {
                    let error = anyhow!(error);
                    self.diagnostics
                        .report(&format!("service `{name}` port negotiation"), &error);
                    pending.push(Pending::Failed {
                        name,
                        host,
                        reason: format!("{error:#}"),
                    });
                    continue;
                }
            };
            let start = tokio::spawn(start_service(kind, host.clone(), port));
            pending.push(Pending::Starting {
                name,
                host,
                port,
                start,
            });
        }

        let mut handles = Vec::with_capacity(pending.len());
        for entry in pending {
            match entry {
                Pending::Failed { name, host, reason } => {
                    handles.push(ServiceHandle::failed(name, host, None, reason));
                }
                Pending::Starting {
                    name,
                    host,
                    port,
                    start,
                } => match start.await {
                    Ok(Ok(started)) => {
                        let (process, server) = match started {
                            Started::Static(task) => (None, Some(task)),
                            Started::Process(child) => (Some(child), None),
                        };
                        handles.push(ServiceHandle {
                            name,
                            host,
                            bound_port: Some(port),
                            status: ServiceStatus::Running,
                            process,
                            server,
                        });
                    }
                    Ok(Err(error)) => {
                        self.diagnostics
                            .report(&format!("service `{name}` startup"), &error);
                        handles.push(ServiceHandle::failed(
                            name,
                            host,
                            Some(port),
                            format!("{error:#}"),
                        ));
                    }
                    Err(join_error) => {
                        let error = anyhow!(join_error).context("startup task aborted");
                        self.diagnostics
                            .report(&format!("service `{name}` startup"), &error);
                        handles.push(ServiceHandle::failed(
                            name,
                            host,
                            Some(port),
                            format!("{error:#}"),
                        ));
                    }
                },
            }
        }
        handles
    }
}

async fn start_service(kind: ServiceKind, host: String, port: u16) -> Result<Started> {
    match kind {
        ServiceKind::StaticDir { root } => {
            if !root.is_dir() {
                anyhow::bail!("static root {} is not a directory", root.display());
            }
            let listener = TcpListener::bind((host.as_str(), port))
                .await
                .with_context(|| format!("failed to bind {host}:{port}"))?;
            let app = static_router(root);
            let task = tokio::spawn(async move {
                if let Err(error) = axum::serve(listener, app).await {
                    tracing::error!("static server on port {port} stopped: {error}");
                }
            });
            Ok(Started::Static(task))
        }
        ServiceKind::Subprocess { mut spec } => {
            spec.env
                .push((OsString::from("PORT"), OsString::from(port.to_string())));
            let child = process::spawn(&spec)?;
            Ok(Started::Process(child))
        }
    }
}

// CORS open and caching off, matching what the simulator shell expects from
// its asset hosts.
fn static_router(root: PathBuf) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}

pub struct WebStackOptions {
    pub project_dir: PathBuf,
    pub target_h5_url: Option<String>,
}

/// Bring up the web preview stack and open the composed simulator URL.
///
/// The four services fail independently; only the final browser launch has a
/// soft dependency on the simulator framework server. Whatever started stays
/// running and is returned for session teardown.
pub async fn launch_web_stack(
    options: WebStackOptions,
    web: &WebSection,
    collaborators: &dyn Collaborators,
    diagnostics: Arc<dyn DiagnosticsSink>,
) -> Vec<ServiceHandle> {
    let host = web.host.clone();
    let mut specs = Vec::new();

    if options.target_h5_url.is_none() {
        let spec = CommandSpec::new("npm")
            .arg("run")
            .arg("start")
            .env("BROWSER", "none")
            .current_dir(&options.project_dir)
            .stdio(StdioMode::Inherit);
        specs.push(ServiceSpec {
            name: TARGET_H5.to_string(),
            host: host.clone(),
            preferred_port: web.target_h5_port,
            kind: ServiceKind::Subprocess { spec },
        });
    }

    specs.push(ServiceSpec {
        name: SIMULATOR_ASSETS.to_string(),
        host: host.clone(),
        preferred_port: web.assets_port,
        kind: ServiceKind::StaticDir {
            root: assets_dir(web, &options.project_dir),
        },
    });
    specs.push(ServiceSpec {
        name: SIMULATOR_FRAMEWORK.to_string(),
        host: host.clone(),
        preferred_port: web.framework_port,
        kind: ServiceKind::StaticDir {
            root: framework_dir(web, &options.project_dir),
        },
    });
    let proxy_spec = CommandSpec::new("node")
        .arg(proxy_script(web, &options.project_dir))
        .current_dir(&options.project_dir)
        .stdio(StdioMode::Ignore);
    specs.push(ServiceSpec {
        name: PROXY_SERVER.to_string(),
        host: host.clone(),
        preferred_port: web.proxy_server_port,
        kind: ServiceKind::Subprocess { spec: proxy_spec },
    });

    let orchestrator = ServiceOrchestrator::new(diagnostics.clone());
    let handles = orchestrator.bring_up(specs).await;

    for handle in &handles {
        match &handle.status {
            ServiceStatus::Running => {
                if let Some(url) = handle.url() {
                    println!("{} listening at {url}", handle.name);
                }
            }
            ServiceStatus::Failed(reason) => {
                eprintln!("{} failed to start: {reason}", handle.name);
            }
            ServiceStatus::Starting => {}
        }
    }

    let find = |name: &str| handles.iter().find(|h| h.name == name);
    let framework = find(SIMULATOR_FRAMEWORK);
    match framework.and_then(ServiceHandle::url) {
        Some(framework_url) => {
            let target_h5_url = options
                .target_h5_url
                .clone()
                .or_else(|| find(TARGET_H5).and_then(ServiceHandle::url))
                .unwrap_or_default();
            let assets_url = find(SIMULATOR_ASSETS)
                .and_then(ServiceHandle::url)
                .unwrap_or_default();
            let proxy_url = find(PROXY_SERVER)
                .and_then(ServiceHandle::url)
                .unwrap_or_default();
            let simulator_url = format!(
                "{framework_url}/webSimulator.html?lyraBaseUrl={assets_url}&targetH5Url={target_h5_url}/&proxyServerUrl={proxy_url}"
            );
            println!("Opening web simulator at {simulator_url}");
            if let Err(error) = collaborators.open_url(&simulator_url).await {
                diagnostics.report("opening the web simulator", &error);
            }
        }
        None => {
            eprintln!(
                "Simulator framework did not start; skipping browser launch. \
                 Services that did start remain available."
            );
        }
    }

    handles
}

fn assets_dir(web: &WebSection, project_dir: &Path) -> PathBuf {
    web.assets_dir
        .clone()
        .unwrap_or_else(|| project_dir.join(".lyra").join("simulator-assets"))
}

fn framework_dir(web: &WebSection, project_dir: &Path) -> PathBuf {
    web.framework_dir
        .clone()
        .unwrap_or_else(|| project_dir.join(".lyra").join("web-simulator"))
}

fn proxy_script(web: &WebSection, project_dir: &Path) -> PathBuf {
    web.proxy_script
        .clone()
        .unwrap_or_else(|| project_dir.join(".lyra").join("simulator-proxy.js"))
}
