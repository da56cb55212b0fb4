//! Point-in-time system snapshot via the sysinfo crate.
//!
//! One synchronous call gathers host identity, CPU, memory, disk, and
//! network-interface counters into a serializable report.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::{CpuExt, DiskExt, NetworkExt, NetworksExt, System, SystemExt};
use tracing::debug;

/// Delay between the two CPU refreshes a usage delta needs.
const CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Serialize)]
pub struct SystemReport {
    pub hostname: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub arch: String,
    pub uptime_secs: u64,
    pub uptime_human: String,
    pub cpu: CpuReport,
    pub memory: MemoryReport,
    pub disks: Vec<DiskReport>,
    pub interfaces: Vec<InterfaceReport>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CpuReport {
    pub count: usize,
    pub brand: Option<String>,
    pub usage_percent: f64,
    pub frequency_mhz: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_avg: Option<LoadAverages>,
}

#[derive(Debug, Serialize)]
pub struct LoadAverages {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Serialize)]
pub struct MemoryReport {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub usage_percent: f64,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
}

#[derive(Debug, Serialize)]
pub struct DiskReport {
    pub mount: String,
    pub filesystem: String,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub usage_percent: f64,
}

#[derive(Debug, Serialize)]
pub struct InterfaceReport {
    pub name: String,
    pub rx_bytes_total: u64,
    pub tx_bytes_total: u64,
    pub rx_packets_total: u64,
    pub tx_packets_total: u64,
}

/// Take one snapshot of the host. Blocks briefly for the second CPU sample.
pub fn snapshot() -> SystemReport {
    debug!("gathering system snapshot");

    let mut sys = System::new_all();
    // CPU usage is a delta between two samples.
    std::thread::sleep(CPU_SAMPLE_INTERVAL);
    sys.refresh_cpu();

    let cpus = sys.cpus();
    let usage_percent = if cpus.is_empty() {
        0.0
    } else {
        cpus.iter().map(|c| f64::from(c.cpu_usage())).sum::<f64>() / cpus.len() as f64
    };

    let load_avg = if cfg!(windows) {
        None
    } else {
        let load = sys.load_average();
        Some(LoadAverages {
            one: load.one,
            five: load.five,
            fifteen: load.fifteen,
        })
    };

    let cpu = CpuReport {
        count: cpus.len(),
        brand: cpus.first().map(|c| c.brand().to_string()),
        usage_percent,
        frequency_mhz: cpus.first().map(|c| c.frequency()).filter(|f| *f > 0),
        load_avg,
    };

    // sysinfo 0.29 reports memory in kilobytes.
    let total_bytes = sys.total_memory() * 1024;
    let used_bytes = sys.used_memory() * 1024;
    let memory = MemoryReport {
        total_bytes,
        used_bytes,
        available_bytes: sys.available_memory() * 1024,
        usage_percent: if total_bytes > 0 {
            (used_bytes as f64 / total_bytes as f64) * 100.0
        } else {
            0.0
        },
        swap_total_bytes: sys.total_swap() * 1024,
        swap_used_bytes: sys.used_swap() * 1024,
    };

    let disks = sys
        .disks()
        .iter()
        .map(|d| {
            let total = d.total_space();
            let used = total.saturating_sub(d.available_space());
            DiskReport {
                mount: d.mount_point().to_string_lossy().into_owned(),
                filesystem: String::from_utf8_lossy(d.file_system()).into_owned(),
                total_bytes: total,
                used_bytes: used,
                usage_percent: if total > 0 {
                    (used as f64 / total as f64) * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect();

    let mut interfaces: Vec<InterfaceReport> = sys
        .networks()
        .iter()
        .map(|(name, data)| InterfaceReport {
            name: name.to_string(),
            rx_bytes_total: data.total_received(),
            tx_bytes_total: data.total_transmitted(),
            rx_packets_total: data.total_packets_received(),
            tx_packets_total: data.total_packets_transmitted(),
        })
        .collect();
    // Map iteration order is arbitrary; keep the report stable.
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));

    let uptime_secs = sys.uptime();

    SystemReport {
        hostname: sys.host_name(),
        os_name: sys.name(),
        os_version: sys.os_version(),
        kernel_version: sys.kernel_version(),
        arch: std::env::consts::ARCH.to_string(),
        uptime_secs,
        uptime_human: humantime::format_duration(Duration::from_secs(uptime_secs)).to_string(),
        cpu,
        memory,
        disks,
        interfaces,
        timestamp: Utc::now(),
    }
}
