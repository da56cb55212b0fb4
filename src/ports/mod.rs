//! Concurrent TCP port checker.
//!
//! Attempts a short-lived connection to every requested port on one host,
//! bounded by a per-port timeout and a cap on in-flight attempts. Individual
//! failures are captured in the per-port result and never abort the batch;
//! only invalid input is rejected, before any connection attempt is made.

pub mod services;

pub use services::{common_ports, default_port, service_name};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound on simultaneous in-flight connection attempts; the rest of the
/// batch queues behind the semaphore.
const MAX_IN_FLIGHT: usize = 256;

/// Default per-port connection timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Invalid request shape, rejected before any network activity.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("'{0}' is not a valid hostname or address")]
    MalformedHost(String),

    #[error("no ports to check")]
    EmptyPorts,

    #[error("port 0 is outside the valid range 1-65535")]
    PortZero,

    #[error("timeout must be greater than zero")]
    ZeroTimeout,

    #[error("unknown service '{name}' (known services: {known})")]
    UnknownService { name: String, known: String },
}

/// A validated check request: host, de-duplicated ascending ports, timeout.
///
/// Built once from user input, executed once, then discarded.
#[derive(Debug, Clone)]
pub struct PortCheckRequest {
    host: String,
    ports: Vec<u16>,
    timeout: Duration,
}

impl PortCheckRequest {
    pub fn new(host: &str, ports: &[u16], timeout: Duration) -> Result<Self, UsageError> {
        if host.is_empty() {
            return Err(UsageError::EmptyHost);
        }
        if !crate::runner::is_valid_target(host) {
            return Err(UsageError::MalformedHost(host.to_string()));
        }
        if ports.is_empty() {
            return Err(UsageError::EmptyPorts);
        }
        if ports.contains(&0) {
            return Err(UsageError::PortZero);
        }
        if timeout.is_zero() {
            return Err(UsageError::ZeroTimeout);
        }

        let mut ports = ports.to_vec();
        ports.sort_unstable();
        ports.dedup();

        Ok(Self {
            host: host.to_string(),
            ports,
            timeout,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Open,
    Closed,
    Error,
}

impl std::fmt::Display for PortStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortStatus::Open => write!(f, "open"),
            PortStatus::Closed => write!(f, "closed"),
            PortStatus::Error => write!(f, "error"),
        }
    }
}

/// Terminal outcome of one connection attempt.
#[derive(Debug, Clone, Serialize)]
pub struct PortCheckResult {
    pub port: u16,
    pub status: PortStatus,
    pub elapsed_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregate over one host: each requested port lands in exactly one of the
/// three status buckets, and `results` holds them all in ascending port order.
#[derive(Debug, Serialize)]
pub struct PortCheckSummary {
    pub host: String,
    pub open: Vec<u16>,
    pub closed: Vec<u16>,
    pub errored: Vec<u16>,
    pub elapsed_ms: f64,
    pub results: Vec<PortCheckResult>,
}

/// Check every port in the request concurrently and aggregate the outcomes.
///
/// Returns only after every requested port has a terminal status; per-port
/// failures (refusal, timeout, resolution error) never fail the batch.
pub async fn check_ports(request: &PortCheckRequest) -> PortCheckSummary {
    debug!(host = %request.host, ports = request.ports.len(), "starting port check");

    let started = Instant::now();
    let limiter = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
    let host: Arc<str> = Arc::from(request.host.as_str());
    let mut attempts = JoinSet::new();

    for &port in &request.ports {
        let permit = limiter
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore in scope");
        let host = host.clone();
        let timeout = request.timeout;

        attempts.spawn(async move {
            let _permit = permit; // hold the slot until the attempt resolves
            check_one(host.as_ref(), port, timeout).await
        });
    }

    let mut results: Vec<PortCheckResult> = Vec::with_capacity(request.ports.len());
    while let Some(joined) = attempts.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!(error = %e, "port check task failed to join"),
        }
    }

    // Completion order is arbitrary; the contract is ascending port order.
    results.sort_unstable_by_key(|r| r.port);

    let mut open = Vec::new();
    let mut closed = Vec::new();
    let mut errored = Vec::new();
    for r in &results {
        match r.status {
            PortStatus::Open => open.push(r.port),
            PortStatus::Closed => closed.push(r.port),
            PortStatus::Error => errored.push(r.port),
        }
    }

    PortCheckSummary {
        host: request.host.clone(),
        open,
        closed,
        errored,
        elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        results,
    }
}

async fn check_one(host: &str, port: u16, timeout: Duration) -> PortCheckResult {
    let started = Instant::now();
    let attempt = tokio::time::timeout(timeout, TcpStream::connect((host, port))).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let (status, detail) = match attempt {
        Ok(Ok(stream)) => {
            // Open. Nothing is sent; drop the connection right away.
            drop(stream);
            (PortStatus::Open, None)
        }
        // Active refusal and timeout both count as closed.
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
            (PortStatus::Closed, None)
        }
        Err(_) => (PortStatus::Closed, None),
        // Anything else (resolution failure, unreachable network, permission
        // denied) is an error outcome for this port only.
        Ok(Err(e)) => (PortStatus::Error, Some(e.to_string())),
    };

    debug!(%host, %port, %status, elapsed_ms, "port attempt resolved");

    PortCheckResult {
        port,
        status,
        elapsed_ms,
        service: services::service_name(port),
        detail,
    }
}

/// Check the default ports of all well-known services in one batch.
pub async fn check_common_ports(
    host: &str,
    timeout: Duration,
) -> Result<PortCheckSummary, UsageError> {
    let request = PortCheckRequest::new(host, &services::common_ports(), timeout)?;
    Ok(check_ports(&request).await)
}

/// Check a single service by name ("http", "ssh", ...) on its default port.
pub async fn check_service(
    host: &str,
    service: &str,
    timeout: Duration,
) -> Result<PortCheckSummary, UsageError> {
    let port = services::default_port(service).ok_or_else(|| UsageError::UnknownService {
        name: service.to_string(),
        known: services::known_services().join(", "),
    })?;
    let request = PortCheckRequest::new(host, &[port], timeout)?;
    Ok(check_ports(&request).await)
}
