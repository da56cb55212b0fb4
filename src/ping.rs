//! System ping wrapper -- build the platform command, scrape its text output.
//!
//! The ping protocol itself stays in the external tool; this module only
//! shapes arguments and turns the transcript into packet counts, loss, and
//! RTT statistics.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::runner::{is_valid_target, CommandOutput, CommandRunner, RunnerError};

/// Extra wall-clock allowance on top of count * per-packet timeout.
const SUBPROCESS_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PingOptions {
    /// Number of echo requests to send.
    pub count: u32,
    /// Per-packet timeout.
    pub timeout: Duration,
    /// Payload size in bytes, when the default is not wanted.
    pub packet_size: Option<u32>,
}

impl Default for PingOptions {
    fn default() -> Self {
        Self {
            count: 4,
            timeout: Duration::from_secs(5),
            packet_size: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PingError {
    #[error("invalid ping target '{0}'")]
    InvalidTarget(String),

    #[error("ping count must be greater than zero")]
    ZeroCount,

    #[error(transparent)]
    Runner(#[from] RunnerError),
}

#[derive(Debug, Clone, Serialize)]
pub struct PingReport {
    pub host: String,
    pub packets_sent: u32,
    pub packets_received: u32,
    pub loss_percent: f64,
    pub times_ms: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ping a host and report packet counts, loss, and RTT statistics.
///
/// A host that never answers is still a report (100% loss), not an error;
/// only a bad target or a ping binary that cannot be run raises.
pub async fn ping(
    runner: &dyn CommandRunner,
    host: &str,
    opts: &PingOptions,
) -> Result<PingReport, PingError> {
    if !is_valid_target(host) {
        return Err(PingError::InvalidTarget(host.to_string()));
    }
    if opts.count == 0 {
        return Err(PingError::ZeroCount);
    }

    let args = build_args(host, opts);
    debug!(%host, count = opts.count, "pinging");

    let overall = opts
        .timeout
        .checked_mul(opts.count)
        .unwrap_or(Duration::from_secs(3600))
        + SUBPROCESS_GRACE;
    let output = runner.run("ping", &args, overall).await?;

    Ok(scrape_output(&output, host, opts.count))
}

fn build_args(host: &str, opts: &PingOptions) -> Vec<String> {
    let mut args = if cfg!(windows) {
        // Windows ping takes its per-reply timeout in milliseconds.
        vec![
            "-n".to_string(),
            opts.count.to_string(),
            "-w".to_string(),
            opts.timeout.as_millis().to_string(),
        ]
    } else {
        vec![
            "-c".to_string(),
            opts.count.to_string(),
            "-W".to_string(),
            opts.timeout.as_secs().max(1).to_string(),
        ]
    };

    if let Some(size) = opts.packet_size {
        args.push(if cfg!(windows) { "-l" } else { "-s" }.to_string());
        args.push(size.to_string());
    }

    args.push(host.to_string());
    args
}

struct ParsedPing {
    times_ms: Vec<f64>,
    loss_percent: Option<f64>,
}

fn scrape_output(output: &CommandOutput, host: &str, sent: u32) -> PingReport {
    let parsed = if cfg!(windows) {
        parse_windows(&output.stdout)
    } else {
        parse_unix(&output.stdout)
    };

    let received = parsed.times_ms.len() as u32;
    let loss_percent = parsed.loss_percent.unwrap_or_else(|| {
        if sent == 0 {
            100.0
        } else {
            (sent.saturating_sub(received) as f64 / sent as f64) * 100.0
        }
    });

    let (min_ms, avg_ms, max_ms) = summarize(&parsed.times_ms);

    // Nothing came back and the tool complained: carry its message along.
    let error = if received == 0 && !output.stderr.trim().is_empty() {
        Some(output.stderr.trim().to_string())
    } else {
        None
    };

    PingReport {
        host: host.to_string(),
        packets_sent: sent,
        packets_received: received,
        loss_percent,
        times_ms: parsed.times_ms,
        min_ms,
        avg_ms,
        max_ms,
        error,
    }
}

fn parse_unix(output: &str) -> ParsedPing {
    let mut times = Vec::new();
    for line in output.lines() {
        // "64 bytes from 8.8.8.8: icmp_seq=1 ttl=56 time=19.6 ms"
        if let Some(v) = number_after(line, "time=") {
            times.push(v);
        }
    }

    // "4 packets transmitted, 4 received, 0% packet loss, time 3004ms"
    let mut loss = None;
    for line in output.lines() {
        if let Some(pos) = line.find("% packet loss") {
            let head = &line[..pos];
            if let Some(token) = head.rsplit([' ', ',']).next() {
                loss = token.parse::<f64>().ok();
            }
            break;
        }
    }

    ParsedPing {
        times_ms: times,
        loss_percent: loss,
    }
}

fn parse_windows(output: &str) -> ParsedPing {
    let mut times = Vec::new();
    for line in output.lines() {
        // "Reply from 8.8.8.8: bytes=32 time=20ms TTL=56", sub-millisecond
        // replies print "time<1ms".
        if !line.contains("Reply from") {
            continue;
        }
        if let Some(v) = number_after(line, "time=").or_else(|| number_after(line, "time<")) {
            times.push(v);
        }
    }

    // "Packets: Sent = 4, Received = 4, Lost = 0 (0% loss)"
    let mut loss = None;
    for line in output.lines() {
        if let Some(pos) = line.find("% loss") {
            let digits: String = line[..pos]
                .chars()
                .rev()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            let digits: String = digits.chars().rev().collect();
            loss = digits.parse::<f64>().ok();
            break;
        }
    }

    ParsedPing {
        times_ms: times,
        loss_percent: loss,
    }
}

/// Parse the number immediately following `needle` in `line`.
fn number_after(line: &str, needle: &str) -> Option<f64> {
    let pos = line.find(needle)?;
    let rest = &line[pos + needle.len()..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    rest[..end].parse::<f64>().ok()
}

fn summarize(times: &[f64]) -> (Option<f64>, Option<f64>, Option<f64>) {
    if times.is_empty() {
        return (None, None, None);
    }
    let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = times.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let avg = times.iter().sum::<f64>() / times.len() as f64;
    (Some(min), Some(avg), Some(max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::FakeRunner;

    const UNIX_TRANSCRIPT: &str = "\
PING 8.8.8.8 (8.8.8.8) 56(84) bytes of data.
64 bytes from 8.8.8.8: icmp_seq=1 ttl=56 time=19.6 ms
64 bytes from 8.8.8.8: icmp_seq=2 ttl=56 time=18.2 ms
64 bytes from 8.8.8.8: icmp_seq=3 ttl=56 time=23.1 ms
64 bytes from 8.8.8.8: icmp_seq=4 ttl=56 time=20.5 ms

--- 8.8.8.8 ping statistics ---
4 packets transmitted, 4 received, 0% packet loss, time 3004ms
rtt min/avg/max/mdev = 18.238/20.358/23.121/1.789 ms
";

    const WINDOWS_TRANSCRIPT: &str = "\
Pinging 8.8.8.8 with 32 bytes of data:
Reply from 8.8.8.8: bytes=32 time=20ms TTL=56
Reply from 8.8.8.8: bytes=32 time<1ms TTL=56
Reply from 8.8.8.8: bytes=32 time=23ms TTL=56
Request timed out.

Ping statistics for 8.8.8.8:
    Packets: Sent = 4, Received = 3, Lost = 1 (25% loss),
";

    #[test]
    fn test_parse_unix_transcript() {
        let parsed = parse_unix(UNIX_TRANSCRIPT);
        assert_eq!(parsed.times_ms.len(), 4);
        assert_eq!(parsed.times_ms[0], 19.6);
        assert_eq!(parsed.loss_percent, Some(0.0));
    }

    #[test]
    fn test_parse_windows_transcript() {
        let parsed = parse_windows(WINDOWS_TRANSCRIPT);
        assert_eq!(parsed.times_ms, vec![20.0, 1.0, 23.0]);
        assert_eq!(parsed.loss_percent, Some(25.0));
    }

    #[test]
    fn test_no_replies_is_total_loss() {
        let output = CommandOutput {
            status: Some(1),
            stdout: "PING 10.255.255.1 (10.255.255.1) 56(84) bytes of data.\n\n\
                     --- 10.255.255.1 ping statistics ---\n\
                     4 packets transmitted, 0 received, 100% packet loss, time 3060ms\n"
                .to_string(),
            stderr: String::new(),
        };
        let report = scrape_output(&output, "10.255.255.1", 4);
        assert_eq!(report.packets_received, 0);
        assert_eq!(report.loss_percent, 100.0);
        assert!(report.min_ms.is_none());
        assert!(report.avg_ms.is_none());
    }

    #[test]
    fn test_number_after() {
        assert_eq!(number_after("time=19.6 ms", "time="), Some(19.6));
        assert_eq!(number_after("time=20ms TTL=56", "time="), Some(20.0));
        assert_eq!(number_after("no marker here", "time="), None);
    }

    #[tokio::test]
    async fn test_ping_rejects_bad_target() {
        let runner = FakeRunner::succeeding("");
        let err = ping(&runner, "-c; rm -rf /", &PingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PingError::InvalidTarget(_)));
        assert!(runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ping_rejects_zero_count() {
        let runner = FakeRunner::succeeding("");
        let opts = PingOptions {
            count: 0,
            ..PingOptions::default()
        };
        let err = ping(&runner, "example.com", &opts).await.unwrap_err();
        assert!(matches!(err, PingError::ZeroCount));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ping_end_to_end_with_fake_runner() {
        let runner = FakeRunner::succeeding(UNIX_TRANSCRIPT);
        let report = ping(&runner, "8.8.8.8", &PingOptions::default())
            .await
            .unwrap();

        assert_eq!(report.packets_sent, 4);
        assert_eq!(report.packets_received, 4);
        assert_eq!(report.loss_percent, 0.0);
        assert!(report.avg_ms.unwrap() > 18.0 && report.avg_ms.unwrap() < 24.0);

        let calls = runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "ping");
        assert_eq!(calls[0].1.last().map(String::as_str), Some("8.8.8.8"));
    }
}
