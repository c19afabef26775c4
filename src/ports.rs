use std::collections::HashSet;
use std::fmt;
use std::io;

use tokio::net::TcpListener;

/// Upper bound on probe attempts for a single negotiation.
pub const MAX_PROBES: u16 = 128;

#[derive(Debug)]
pub enum PortError {
    Exhausted { start: u16, probes: u16 },
    PermissionDenied { port: u16, source: io::Error },
    Io { port: u16, source: io::Error },
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortError::Exhausted { start, probes } => write!(
                f,
                "no free port found after probing {probes} ports starting at {start}"
            ),
            PortError::PermissionDenied { port, source } => {
                write!(f, "binding port {port} was denied: {source}")
            }
            PortError::Io { port, source } => {
                write!(f, "binding port {port} failed: {source}")
            }
        }
    }
}

impl std::error::Error for PortError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PortError::Exhausted { .. } => None,
            PortError::PermissionDenied { source, .. } | PortError::Io { source, .. } => {
                Some(source)
            }
        }
    }
}

/// Confirm a free port at or above `preferred` on `host`. The probe socket is
/// released before returning, so the caller must bind the port promptly.
pub async fn choose_port(host: &str, preferred: u16) -> Result<u16, PortError> {
    probe(host, preferred, &HashSet::new()).await
}

/// Port negotiation with a claimed set: ports handed out earlier in the
/// session are skipped even when they probe as bindable, which closes the
/// window between releasing a probe socket and the service binding it.
pub struct PortNegotiator {
    claimed: HashSet<u16>,
}

impl PortNegotiator {
    pub fn new() -> Self {
        Self {
            claimed: HashSet::new(),
        }
    }

    pub async fn choose(&mut self, host: &str, preferred: u16) -> Result<u16, PortError> {
        let port = probe(host, preferred, &self.claimed).await?;
        self.claimed.insert(port);
        Ok(port)
    }

    pub fn claimed(&self) -> &HashSet<u16> {
        &self.claimed
    }
}

impl Default for PortNegotiator {
    fn default() -> Self {
        Self::new()
    }
}

async fn probe(host: &str, preferred: u16, claimed: &HashSet<u16>) -> Result<u16, PortError> {
    let mut port = preferred;
    for _ in 0..MAX_PROBES {
        if !claimed.contains(&port) {
            match TcpListener::bind((host, port)).await {
                Ok(listener) => {
                    drop(listener);
                    return Ok(port);
                }
                Err(error) if error.kind() == io::ErrorKind::AddrInUse => {}
                Err(error) if error.kind() == io::ErrorKind::PermissionDenied => {
                    return Err(PortError::PermissionDenied {
                        port,
                        source: error,
                    });
                }
                Err(error) => return Err(PortError::Io {
                    port,
                    source: error,
                }),
            }
        }
        port = match port.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }
    Err(PortError::Exhausted {
        start: preferred,
        probes: MAX_PROBES,
    })
}
