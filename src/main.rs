use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

use netdiag::ping::{self, PingOptions, PingReport};
use netdiag::ports::{self, PortCheckRequest, PortCheckSummary};
use netdiag::runner::SystemRunner;
use netdiag::system::{self, SystemReport};
use netdiag::throughput::{self, BandwidthReport, ClientOptions};
use netdiag::trace::{self, TraceReport};

#[derive(Parser)]
#[command(
    name = "netdiag",
    about = "Cross-platform CLI toolkit for network and system diagnostics",
    version,
    long_about = None
)]
struct Cli {
    /// Verbose (debug-level) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether TCP ports are open on a host
    CheckPorts {
        /// Ports to check, comma separated (e.g. 22,80,443)
        #[arg(value_delimiter = ',')]
        ports: Vec<u16>,

        /// Host to check
        #[arg(long, default_value = "localhost")]
        host: String,

        /// Per-port connection timeout in seconds
        #[arg(long, short, default_value_t = 5)]
        timeout: u64,

        /// Check the default ports of all well-known services instead
        #[arg(long, conflicts_with = "ports")]
        common: bool,

        /// Check a single named service (http, ssh, ...) on its default port
        #[arg(long, conflicts_with_all = ["ports", "common"])]
        service: Option<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Ping a host and report packet loss and round-trip times
    Ping {
        /// Host to ping
        host: String,

        /// Number of echo requests
        #[arg(long, short, default_value_t = 4)]
        count: u32,

        /// Per-packet timeout in seconds
        #[arg(long, short, default_value_t = 5)]
        timeout: u64,

        /// Payload size in bytes
        #[arg(long)]
        size: Option<u32>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Run an iperf3 bandwidth test in client or server mode
    Iperf3 {
        /// Run in server mode
        #[arg(long, short)]
        server: bool,

        /// Connect to an iperf3 server at this address
        #[arg(long, short, conflicts_with = "server")]
        client: Option<String>,

        /// Port to use
        #[arg(long, short, default_value_t = throughput::DEFAULT_PORT)]
        port: u16,

        /// Test duration in seconds
        #[arg(long, short = 't', default_value_t = 10)]
        duration: u32,

        /// Number of parallel streams
        #[arg(long, short = 'P', default_value_t = 1)]
        streams: u32,

        /// Reverse direction (server sends)
        #[arg(long, short = 'R')]
        reverse: bool,

        /// Bind address for server mode
        #[arg(long)]
        bind: Option<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Trace the route to a host
    Traceroute {
        /// Host to trace
        host: String,

        /// Maximum number of hops
        #[arg(long, default_value_t = 30)]
        max_hops: u32,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show a point-in-time system snapshot
    Sysinfo {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; --verbose wins over RUST_LOG.
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runner = SystemRunner;

    match cli.command {
        Commands::CheckPorts {
            ports,
            host,
            timeout,
            common,
            service,
            json,
        } => {
            let timeout = Duration::from_secs(timeout);
            let summary = if let Some(name) = service {
                ports::check_service(&host, &name, timeout).await?
            } else if common {
                ports::check_common_ports(&host, timeout).await?
            } else {
                let request = PortCheckRequest::new(&host, &ports, timeout)?;
                ports::check_ports(&request).await
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                render_port_summary(&summary);
            }
        }

        Commands::Ping {
            host,
            count,
            timeout,
            size,
            json,
        } => {
            let opts = PingOptions {
                count,
                timeout: Duration::from_secs(timeout),
                packet_size: size,
            };
            let report = ping::ping(&runner, &host, &opts).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render_ping_report(&report);
            }
        }

        Commands::Iperf3 {
            server,
            client,
            port,
            duration,
            streams,
            reverse,
            bind,
            json,
        } => {
            if server {
                let code = throughput::run_server(port, bind.as_deref()).await?;
                if code != 0 {
                    anyhow::bail!("iperf3 server exited with code {code}");
                }
            } else if let Some(host) = client {
                throughput::verify_installed(&runner).await?;
                let opts = ClientOptions {
                    port,
                    duration_secs: duration,
                    streams,
                    reverse,
                };
                let report = throughput::run_client(&runner, &host, &opts).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    render_bandwidth_report(&report);
                }
            } else {
                anyhow::bail!("specify either --server or --client <host>");
            }
        }

        Commands::Traceroute {
            host,
            max_hops,
            json,
        } => {
            let report = trace::trace_route(&runner, &host, max_hops).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render_trace_report(&report);
            }
        }

        Commands::Sysinfo { json } => {
            let report = system::snapshot();

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                render_system_report(&report);
            }
        }
    }

    Ok(())
}

fn render_port_summary(summary: &PortCheckSummary) {
    println!("\nPort check for {}", summary.host);
    println!(
        "{:<8} | {:<8} | {:<12} | Service",
        "Port", "Status", "Elapsed"
    );
    println!("{:-<8}-|-{:-<8}-|-{:-<12}-|-{:-<12}", "", "", "", "");
    for result in &summary.results {
        println!(
            "{:<8} | {:<8} | {:<12} | {}",
            result.port,
            result.status.to_string(),
            format!("{:.1} ms", result.elapsed_ms),
            result.service.unwrap_or("-"),
        );
        if let Some(detail) = &result.detail {
            println!("{:<8} | {:<8} |   -> {}", "", "", detail);
        }
    }
    println!(
        "\n{} open, {} closed, {} error(s) in {:.0} ms",
        summary.open.len(),
        summary.closed.len(),
        summary.errored.len(),
        summary.elapsed_ms
    );
}

fn render_ping_report(report: &PingReport) {
    println!("\nPing statistics for {}", report.host);
    println!(
        "  Packets: sent {}, received {}, loss {:.1}%",
        report.packets_sent, report.packets_received, report.loss_percent
    );
    if let (Some(min), Some(avg), Some(max)) = (report.min_ms, report.avg_ms, report.max_ms) {
        println!("  RTT min/avg/max: {:.2}/{:.2}/{:.2} ms", min, avg, max);
    }
    if let Some(error) = &report.error {
        println!("  Error: {}", error);
    }
}

fn render_bandwidth_report(report: &BandwidthReport) {
    println!("\n{}", throughput::format_summary(report));
    println!("{:<20} | Value", "Metric");
    println!("{:-<20}-|-{:-<20}", "", "");
    println!("{:<20} | {}:{}", "Server", report.host, report.port);
    println!("{:<20} | {:.1} s", "Duration", report.duration_secs);
    println!("{:<20} | {}", "Bytes transferred", report.bytes_transferred);
    println!("{:<20} | {:.2} Mbps", "Throughput", report.throughput_mbps);
    if let Some(retransmits) = report.retransmits {
        println!("{:<20} | {}", "Retransmits", retransmits);
    }
    if let (Some(local), Some(remote)) = (report.cpu_local_percent, report.cpu_remote_percent) {
        println!("{:<20} | {:.1}% / {:.1}%", "CPU local/remote", local, remote);
    }
}

fn render_trace_report(report: &TraceReport) {
    println!(
        "\nRoute to {} (max {} hops): {}",
        report.host,
        report.max_hops,
        if report.success { "complete" } else { "incomplete" }
    );
    print!("{}", report.raw_output);
    if let Some(error) = &report.error {
        println!("Error: {}", error);
    }
}

fn render_system_report(report: &SystemReport) {
    let unknown = || "unknown".to_string();

    println!("\nSystem");
    println!("  {:<14} {}", "Hostname:", report.hostname.clone().unwrap_or_else(unknown));
    println!(
        "  {:<14} {} {}",
        "OS:",
        report.os_name.clone().unwrap_or_else(unknown),
        report.os_version.clone().unwrap_or_default()
    );
    println!("  {:<14} {}", "Kernel:", report.kernel_version.clone().unwrap_or_else(unknown));
    println!("  {:<14} {}", "Arch:", report.arch);
    println!("  {:<14} {}", "Uptime:", report.uptime_human);

    println!("\nCPU");
    if let Some(brand) = &report.cpu.brand {
        println!("  {:<14} {}", "Model:", brand);
    }
    println!("  {:<14} {}", "Cores:", report.cpu.count);
    println!("  {:<14} {:.1}%", "Usage:", report.cpu.usage_percent);
    if let Some(freq) = report.cpu.frequency_mhz {
        println!("  {:<14} {} MHz", "Frequency:", freq);
    }
    if let Some(load) = &report.cpu.load_avg {
        println!(
            "  {:<14} {:.2} / {:.2} / {:.2}",
            "Load avg:", load.one, load.five, load.fifteen
        );
    }

    println!("\nMemory");
    println!("  {:<14} {:.2} GiB", "Total:", gib(report.memory.total_bytes));
    println!(
        "  {:<14} {:.2} GiB ({:.1}%)",
        "Used:",
        gib(report.memory.used_bytes),
        report.memory.usage_percent
    );
    println!("  {:<14} {:.2} GiB", "Available:", gib(report.memory.available_bytes));
    if report.memory.swap_total_bytes > 0 {
        println!(
            "  {:<14} {:.2} / {:.2} GiB",
            "Swap used:",
            gib(report.memory.swap_used_bytes),
            gib(report.memory.swap_total_bytes)
        );
    }

    if !report.disks.is_empty() {
        println!("\nDisks");
        println!("{:<20} | {:<8} | {:<10} | {:<10} | Use%", "Mount", "FS", "Total", "Used");
        println!("{:-<20}-|-{:-<8}-|-{:-<10}-|-{:-<10}-|-{:-<6}", "", "", "", "", "");
        for disk in &report.disks {
            println!(
                "{:<20} | {:<8} | {:<10} | {:<10} | {:.1}%",
                disk.mount,
                disk.filesystem,
                format!("{:.1} GiB", gib(disk.total_bytes)),
                format!("{:.1} GiB", gib(disk.used_bytes)),
                disk.usage_percent
            );
        }
    }

    if !report.interfaces.is_empty() {
        println!("\nInterfaces");
        println!("{:<16} | {:<14} | {:<14}", "Name", "RX", "TX");
        println!("{:-<16}-|-{:-<14}-|-{:-<14}", "", "", "");
        for iface in &report.interfaces {
            println!(
                "{:<16} | {:<14} | {:<14}",
                iface.name,
                format!("{:.1} MiB", mib(iface.rx_bytes_total)),
                format!("{:.1} MiB", mib(iface.tx_bytes_total)),
            );
        }
    }
    println!();
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
