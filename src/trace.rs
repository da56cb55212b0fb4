//! Route trace wrapper -- platform trace tool, raw output capture.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::runner::{is_valid_target, CommandRunner, RunnerError};

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("invalid trace target '{0}'")]
    InvalidTarget(String),

    #[error("max hops must be greater than zero")]
    ZeroHops,

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceReport {
    pub host: String,
    pub max_hops: u32,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub raw_output: String,
}

/// Trace the route to a host using the platform tool (`traceroute`/`tracert`).
///
/// The hop output is reported verbatim; only launch failures raise.
pub async fn trace_route(
    runner: &dyn CommandRunner,
    host: &str,
    max_hops: u32,
) -> Result<TraceReport, TraceError> {
    if !is_valid_target(host) {
        return Err(TraceError::InvalidTarget(host.to_string()));
    }
    if max_hops == 0 {
        return Err(TraceError::ZeroHops);
    }

    let (program, args) = if cfg!(windows) {
        (
            "tracert",
            vec!["-h".to_string(), max_hops.to_string(), host.to_string()],
        )
    } else {
        (
            "traceroute",
            vec!["-m".to_string(), max_hops.to_string(), host.to_string()],
        )
    };

    debug!(%host, max_hops, "tracing route");

    // Generous budget: each hop may wait on several probes.
    let overall = Duration::from_secs(u64::from(max_hops) * 5 + 30);
    let output = runner.run(program, &args, overall).await?;

    let stderr = output.stderr.trim();
    Ok(TraceReport {
        host: host.to_string(),
        max_hops,
        success: output.success(),
        error: if stderr.is_empty() {
            None
        } else {
            Some(stderr.to_string())
        },
        raw_output: output.stdout,
    })
}
