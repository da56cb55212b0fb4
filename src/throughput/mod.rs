//! Bandwidth testing via the external iperf3 tool.
//!
//! Client mode runs `iperf3 --json` through the command seam and parses its
//! output into a [`BandwidthReport`]; server mode hands the terminal to a
//! foreground `iperf3 -s` child.

pub mod iperf;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::runner::{is_valid_target, CommandRunner, RunnerError};

/// Extra wall-clock allowance on top of the requested test duration.
const SUBPROCESS_GRACE: Duration = Duration::from_secs(30);

/// iperf3's default listen port.
pub const DEFAULT_PORT: u16 = 5201;

#[derive(Debug, Error)]
pub enum BandwidthError {
    #[error("iperf3 is not installed or not on PATH; install iperf3 to run bandwidth tests")]
    NotInstalled,

    #[error("invalid iperf3 target '{0}'")]
    InvalidTarget(String),

    #[error("iperf3 exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },

    #[error("could not parse iperf3 JSON output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Runner(RunnerError),
}

impl From<RunnerError> for BandwidthError {
    fn from(e: RunnerError) -> Self {
        match e {
            RunnerError::NotFound { .. } => BandwidthError::NotInstalled,
            other => BandwidthError::Runner(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub port: u16,
    pub duration_secs: u32,
    pub streams: u32,
    /// Reverse direction: the server sends, the client receives.
    pub reverse: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            duration_secs: 10,
            streams: 1,
            reverse: false,
        }
    }
}

/// Parsed outcome of one client test.
#[derive(Debug, Serialize)]
pub struct BandwidthReport {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub streams: u32,
    pub reverse: bool,
    pub duration_secs: f64,
    pub bytes_transferred: u64,
    pub bits_per_second: f64,
    pub throughput_mbps: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retransmits: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_local_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_remote_percent: Option<f64>,
}

/// Check that iperf3 is available before running a test.
pub async fn verify_installed(runner: &dyn CommandRunner) -> Result<(), BandwidthError> {
    let output = runner
        .run("iperf3", &["--version".to_string()], Duration::from_secs(10))
        .await?;
    if !output.success() {
        return Err(BandwidthError::NotInstalled);
    }
    debug!("iperf3 found and available");
    Ok(())
}

/// Run an iperf3 client test against `host` and parse its JSON output.
pub async fn run_client(
    runner: &dyn CommandRunner,
    host: &str,
    opts: &ClientOptions,
) -> Result<BandwidthReport, BandwidthError> {
    if !is_valid_target(host) {
        return Err(BandwidthError::InvalidTarget(host.to_string()));
    }

    let mut args = vec![
        "-c".to_string(),
        host.to_string(),
        "-p".to_string(),
        opts.port.to_string(),
        "-t".to_string(),
        opts.duration_secs.to_string(),
        "-P".to_string(),
        opts.streams.to_string(),
        "--json".to_string(),
    ];
    if opts.reverse {
        args.push("-R".to_string());
    }

    info!(%host, port = opts.port, duration = opts.duration_secs, "running iperf3 client test");

    let overall = Duration::from_secs(u64::from(opts.duration_secs)) + SUBPROCESS_GRACE;
    let output = runner.run("iperf3", &args, overall).await?;

    if !output.success() {
        return Err(BandwidthError::Failed {
            code: output.status.unwrap_or(-1),
            stderr: output.stderr.trim().to_string(),
        });
    }

    let parsed = iperf::parse_output(&output.stdout)?;
    Ok(build_report(host, opts, &parsed))
}

fn build_report(host: &str, opts: &ClientOptions, parsed: &iperf::Iperf3Output) -> BandwidthReport {
    // Receiver-side sums reflect what actually arrived; fall back to the
    // sender sums when the server did not report any.
    let primary = parsed
        .end
        .sum_received
        .as_ref()
        .or(parsed.end.sum_sent.as_ref());
    let (duration_secs, bytes, bits) = primary
        .map(|s| (s.seconds, s.bytes, s.bits_per_second))
        .unwrap_or((0.0, 0, 0.0));

    let peer = parsed.start.connecting_to.as_ref();

    BandwidthReport {
        host: peer.map(|p| p.host.clone()).unwrap_or_else(|| host.to_string()),
        port: peer.map(|p| p.port).unwrap_or(opts.port),
        protocol: parsed.start.test_start.protocol.clone(),
        streams: parsed.start.test_start.num_streams,
        reverse: opts.reverse,
        duration_secs,
        bytes_transferred: bytes,
        bits_per_second: bits,
        throughput_mbps: bits / 1_000_000.0,
        retransmits: parsed.end.sum_sent.as_ref().and_then(|s| s.retransmits),
        cpu_local_percent: parsed
            .end
            .cpu_utilization_percent
            .as_ref()
            .map(|c| c.host_total),
        cpu_remote_percent: parsed
            .end
            .cpu_utilization_percent
            .as_ref()
            .map(|c| c.remote_total),
    }
}

/// Launch `iperf3 -s` as a foreground child and wait for it to exit.
///
/// The child inherits stdout/stderr so its progress stays visible; Ctrl+C
/// reaches the whole process group and stops both. Returns the exit code.
pub async fn run_server(port: u16, bind: Option<&str>) -> Result<i32, BandwidthError> {
    let mut cmd = tokio::process::Command::new("iperf3");
    cmd.arg("-s").arg("-p").arg(port.to_string());
    if let Some(addr) = bind {
        if !is_valid_target(addr) {
            return Err(BandwidthError::InvalidTarget(addr.to_string()));
        }
        cmd.arg("-B").arg(addr);
    }

    info!(%port, "starting iperf3 server");

    let status = cmd.status().await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BandwidthError::NotInstalled
        } else {
            BandwidthError::Runner(RunnerError::Launch {
                program: "iperf3".to_string(),
                source: e,
            })
        }
    })?;

    Ok(status.code().unwrap_or(-1))
}

/// Format a bandwidth report as a one-line human-readable summary.
pub fn format_summary(report: &BandwidthReport) -> String {
    let speed = if report.throughput_mbps >= 1000.0 {
        format!("{:.2} Gbps", report.throughput_mbps / 1000.0)
    } else {
        format!("{:.1} Mbps", report.throughput_mbps)
    };

    let direction = if report.reverse { "download" } else { "upload" };

    let mut summary = format!(
        "{} {} to {}:{}: {} ({} stream{}, {:.0}s)",
        report.protocol,
        direction,
        report.host,
        report.port,
        speed,
        report.streams,
        if report.streams == 1 { "" } else { "s" },
        report.duration_secs,
    );

    if let Some(retransmits) = report.retransmits {
        summary.push_str(&format!(", {} retransmit(s)", retransmits));
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::{FakeRunner, MissingRunner};

    #[tokio::test]
    async fn test_run_client_parses_report() {
        let runner = FakeRunner::succeeding(iperf::tests::CLIENT_RESULT);
        let report = run_client(&runner, "192.168.1.5", &ClientOptions::default())
            .await
            .unwrap();

        assert_eq!(report.host, "192.168.1.5");
        assert_eq!(report.port, 5201);
        assert_eq!(report.bytes_transferred, 1181250000);
        assert!((report.throughput_mbps - 945.0).abs() < 0.01);
        assert_eq!(report.retransmits, Some(3));
        assert_eq!(report.cpu_local_percent, Some(4.8));
        assert_eq!(report.cpu_remote_percent, Some(2.1));

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls[0].0, "iperf3");
        assert!(calls[0].1.contains(&"--json".to_string()));
    }

    #[tokio::test]
    async fn test_run_client_maps_nonzero_exit() {
        let runner = FakeRunner::failing(1, "iperf3: error - unable to connect to server");
        let err = run_client(&runner, "192.168.1.5", &ClientOptions::default())
            .await
            .unwrap_err();

        match err {
            BandwidthError::Failed { code, stderr } => {
                assert_eq!(code, 1);
                assert!(stderr.contains("unable to connect"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_iperf3_maps_to_not_installed() {
        let err = verify_installed(&MissingRunner).await.unwrap_err();
        assert!(matches!(err, BandwidthError::NotInstalled));
    }

    #[tokio::test]
    async fn test_run_client_rejects_bad_target() {
        let runner = FakeRunner::succeeding("");
        let err = run_client(&runner, "-R", &ClientOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BandwidthError::InvalidTarget(_)));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_format_summary_scales_units() {
        let mut report = BandwidthReport {
            host: "peer".to_string(),
            port: 5201,
            protocol: "TCP".to_string(),
            streams: 4,
            reverse: false,
            duration_secs: 30.0,
            bytes_transferred: 0,
            bits_per_second: 9_412_000_000.0,
            throughput_mbps: 9412.0,
            retransmits: None,
            cpu_local_percent: None,
            cpu_remote_percent: None,
        };
        assert!(format_summary(&report).contains("9.41 Gbps"));
        assert!(format_summary(&report).contains("4 streams"));

        report.throughput_mbps = 245.3;
        report.streams = 1;
        assert!(format_summary(&report).contains("245.3 Mbps"));
        assert!(format_summary(&report).contains("1 stream,"));
    }
}
